use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::OnceLock;

use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Suffix appended to every certificate entry name.
pub const ENTRY_SUFFIX: &str = "_Certificate.pdf";

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]").expect("valid regex"))
}

/// Replace every character outside `[a-zA-Z0-9]` with `_`.
pub fn sanitize(name: &str) -> String {
    non_alphanumeric().replace_all(name, "_").into_owned()
}

/// Entry name for a participant's certificate, e.g. `Jane_Doe_Certificate.pdf`.
///
/// Distinct names can sanitize to the same entry; those are not renamed.
pub fn entry_name(participant_name: &str) -> String {
    format!("{}{}", sanitize(participant_name), ENTRY_SUFFIX)
}

/// Download name for a whole event, e.g. `Workshop_2025_Certificates.zip`.
pub fn archive_name(event_title: &str) -> String {
    format!("{}_Certificates.zip", sanitize(event_title))
}

/// Bundle `(filename, payload)` pairs into one zip, in the given order.
///
/// Entries carry a fixed timestamp so equal inputs give equal bytes. When two
/// entries share a name the later one wins and the earlier one is dropped.
pub fn package<'a, I>(entries: I) -> zip::result::ZipResult<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let entries: Vec<(&str, &[u8])> = entries.into_iter().collect();
    let mut last_index = HashMap::with_capacity(entries.len());
    for (i, (name, _)) in entries.iter().enumerate() {
        if let Some(previous) = last_index.insert(*name, i) {
            tracing::warn!(entry = name, previous, replaced_by = i, "Duplicate archive entry name");
        }
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (i, (name, payload)) in entries.iter().enumerate() {
        if last_index.get(name) != Some(&i) {
            continue;
        }
        zip.start_file(*name, options)?;
        zip.write_all(payload)?;
    }
    Ok(zip.finish()?.into_inner())
}
