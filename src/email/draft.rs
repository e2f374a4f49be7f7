//! Pre-filled `mailto:` drafts for when no mail service is configured.

use reqwest::Url;
use serde::Serialize;
use tera::Context;

use super::{DistributionError, TemplateParams};
use crate::templates::{get_tera, BULK_BODY, INDIVIDUAL_BODY, SUBJECT};

/// A message ready to hand to the user's mail client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Draft {
    pub to: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub mailto: String,
}

pub fn individual(params: &TemplateParams) -> Result<Draft, DistributionError> {
    let ctx = Context::from_serialize(params)?;
    let subject = get_tera().render(SUBJECT, &ctx)?;
    let body = get_tera().render(INDIVIDUAL_BODY, &ctx)?;
    let mailto = mailto(
        &params.to_email,
        &[("subject", subject.as_str()), ("body", body.as_str())],
    )?;

    Ok(Draft {
        to: vec![params.to_email.clone()],
        bcc: Vec::new(),
        subject,
        body,
        mailto,
    })
}

/// One draft addressed to everyone in BCC.
pub fn bulk(
    event_name: &str,
    from_name: &str,
    recipients: &[TemplateParams],
) -> Result<Draft, DistributionError> {
    let mut ctx = Context::new();
    ctx.insert("event_name", event_name);
    ctx.insert("from_name", from_name);
    ctx.insert("recipients", recipients);

    let subject = get_tera().render(SUBJECT, &ctx)?;
    let body = get_tera().render(BULK_BODY, &ctx)?;
    let bcc: Vec<String> = recipients.iter().map(|r| r.to_email.clone()).collect();
    let bcc_field = bcc.join(",");
    let mailto = mailto(
        "",
        &[
            ("bcc", bcc_field.as_str()),
            ("subject", subject.as_str()),
            ("body", body.as_str()),
        ],
    )?;

    Ok(Draft {
        to: Vec::new(),
        bcc,
        subject,
        body,
        mailto,
    })
}

/// Build a `mailto:` link with percent-encoded header fields.
///
/// Form encoding writes spaces as `+`, which mail clients show verbatim, so
/// they are re-encoded as `%20`. A literal `+` is already `%2B` at that point.
pub fn mailto(to: &str, fields: &[(&str, &str)]) -> Result<String, DistributionError> {
    let mut url = Url::parse(&format!("mailto:{to}"))
        .map_err(|e| DistributionError::InvalidDraft(format!("{to}: {e}")))?;
    url.query_pairs_mut().extend_pairs(fields.iter().copied());
    let query = url.query().unwrap_or_default().replace('+', "%20");
    Ok(format!("mailto:{}?{}", url.path(), query))
}
