use std::path::Path;
use std::sync::OnceLock;
use tera::Tera;

pub const SUBJECT: &str = "email/subject.txt";
pub const INDIVIDUAL_BODY: &str = "email/individual.txt";
pub const BULK_BODY: &str = "email/bulk.txt";

/// Files in this directory with the same name replace the built-in drafts.
const OVERRIDE_DIR: &str = "templates/email";

const BUILTIN: &[(&str, &str)] = &[
    (SUBJECT, "Your Certificate - {{ event_name }}"),
    (
        INDIVIDUAL_BODY,
        "Dear {{ to_name }},

Congratulations on completing {{ event_name }}!

Your certificate details:
• Certificate ID: {{ certificate_id }}
• Verification URL: {{ verification_url }}

Best regards,
{{ from_name }}",
    ),
    (
        BULK_BODY,
        "Dear participants,

Congratulations on completing {{ event_name }}!

Your certificates are ready. Find your name below to verify yours:
{% for r in recipients %}
• {{ r.to_name }}: {{ r.certificate_id }} ({{ r.verification_url }})
{%- endfor %}

Best regards,
{{ from_name }}",
    ),
];

static TERA: OnceLock<Tera> = OnceLock::new();

pub fn get_tera() -> &'static Tera {
    TERA.get_or_init(|| load(Path::new(OVERRIDE_DIR)))
}

fn load(override_dir: &Path) -> Tera {
    let mut tera = Tera::default();
    if let Err(e) = tera.add_raw_templates(BUILTIN.iter().copied()) {
        tracing::error!(error = %e, "Built-in email templates failed to parse");
    }

    let Ok(entries) = std::fs::read_dir(override_dir) else {
        return tera;
    };
    for path in entries.filter_map(Result::ok).map(|e| e.path()) {
        if path.extension().map_or(true, |ext| ext != "txt") {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let name = format!("email/{file_name}");
        match tera.add_template_file(&path, Some(&name)) {
            Ok(()) => tracing::info!(template = %name, "Loaded email template override"),
            Err(e) => tracing::warn!(template = %name, error = %e, "Ignoring invalid template override"),
        }
    }
    tera
}
