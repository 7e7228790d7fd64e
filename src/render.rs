//! Page rendering
//!
//! Turns a check outcome into a view model of notices and links, then into
//! HTML for the page or plain text for JSON and the CLI.

use reqwest::Url;
use serde::Serialize;

use crate::api::service::CheckOutcome;
use crate::config::MessagingConfig;
use crate::resolver::Resolution;

/// Reloads keep the session cookie; reruns go through the restart link.
pub const ALREADY_PROCESSED: &str = "Postcode already processed. Use the link below to retry.";
pub const HUB_MISSING: &str = "HUB_ID not found for your area.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// One message shown to the visitor. `**text**` marks emphasis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: Level,
    pub text: String,
}

impl Notice {
    fn new(level: Level, text: impl Into<String>) -> Self {
        Self { level, text: text.into() }
    }

    /// Text without emphasis markers
    pub fn plain(&self) -> String {
        self.text.replace("**", "")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub notices: Vec<Notice>,
    pub referral_link: Option<String>,
    pub share_link: Option<String>,
    /// Phone number field; collected on the page only
    pub phone_prompt: Option<String>,
    pub restart_link: Option<String>,
}

/// `https://<domain>/refer?postcode=<postcode>`
pub fn referral_link(domain: &str, postcode: &str) -> String {
    let base = format!("https://{}/refer", domain);
    match Url::parse_with_params(&base, &[("postcode", postcode)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?postcode={}", base, postcode),
    }
}

pub fn build_view(outcome: &CheckOutcome, messaging: &MessagingConfig) -> PageView {
    let mut view = PageView::default();

    match outcome {
        CheckOutcome::MissingPostcode => {
            view.notices.push(Notice::new(Level::Error, "No valid postcode provided."));
        }
        CheckOutcome::LoadFailed { detail } => {
            view.notices.push(Notice::new(Level::Error, "Failed to load data."));
            if let Some(detail) = detail {
                view.notices.push(Notice::new(Level::Error, detail.clone()));
            }
        }
        CheckOutcome::AlreadyProcessed { postcode } => {
            view.notices.push(Notice::new(Level::Info, ALREADY_PROCESSED));
            view.restart_link = Some(restart_link(postcode));
        }
        CheckOutcome::Resolved { postcode, resolution } => {
            view.title = Some(format!("{} postcode checker", messaging.brand));
            view.subtitle = Some(format!("Checking deliveries near: {}", postcode));
            fill_resolution(&mut view, postcode, resolution, messaging);
        }
    }

    view
}

fn fill_resolution(
    view: &mut PageView,
    postcode: &str,
    resolution: &Resolution,
    messaging: &MessagingConfig,
) {
    match resolution {
        Resolution::NotFound => {
            view.notices.push(Notice::new(
                Level::Error,
                "We could not find your postcode :( double check and ensure it's valid.",
            ));
        }
        Resolution::HubMissing { .. } => {
            view.notices.push(Notice::new(Level::Error, HUB_MISSING));
        }
        Resolution::NoInterestData { .. } => {
            view.notices.push(Notice::new(
                Level::Info,
                "We found your area but have no sign-up information for it yet.",
            ));
        }
        Resolution::Unserviceable { interest_count, hub, .. } => {
            let text = match hub {
                Some(hub) => format!(
                    "Sorry, we don’t deliver to your area yet, but we are looking at expanding into **{hub}**. \
                     **{count} people** are interested. Get {hub} to {target} sign ups by sharing the link below to get us in your area!",
                    hub = hub.name,
                    count = interest_count,
                    target = messaging.signup_target,
                ),
                None => format!(
                    "Sorry, we don’t deliver to your area yet. **{count} people** nearby are interested. \
                     Get your area to {target} sign ups by sharing the link below to get us in your area!",
                    count = interest_count,
                    target = messaging.signup_target,
                ),
            };
            view.notices.push(Notice::new(Level::Warning, text));

            let link = referral_link(&messaging.referral_domain, postcode);
            view.notices.push(Notice::new(
                Level::Info,
                format!("Share your referral link: {}", link),
            ));
            view.referral_link = Some(link);
            view.share_link = Some(messaging.share_url.clone());
            view.phone_prompt = Some("Enter your phone number to stay updated.".to_string());
        }
    }
}

fn restart_link(postcode: &str) -> String {
    match Url::parse_with_params("http://localhost/", &[("postcode", postcode), ("restart", "1")]) {
        Ok(url) => format!("/?{}", url.query().unwrap_or_default()),
        Err(_) => format!("/?postcode={}&restart=1", postcode),
    }
}

/// Plain-text lines, one per notice
pub fn render_text(view: &PageView) -> String {
    view.notices
        .iter()
        .map(|n| format!("[{:?}] {}", n.level, n.plain()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_html(view: &PageView) -> String {
    let mut body = String::new();

    if let Some(title) = &view.title {
        body.push_str(&format!("<h1>{}</h1>\n", escape_html(title)));
    }
    if let Some(subtitle) = &view.subtitle {
        body.push_str(&format!("<p>{}</p>\n", escape_html(subtitle)));
    }
    for notice in &view.notices {
        let class = match notice.level {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        body.push_str(&format!(
            "<div class=\"notice {}\">{}</div>\n",
            class,
            emphasis_html(&notice.text)
        ));
    }
    if let Some(share) = &view.share_link {
        let share = escape_html(share);
        body.push_str(&format!("<p><a href=\"{0}\">{0}</a></p>\n", share));
    }
    if let Some(prompt) = &view.phone_prompt {
        body.push_str(&format!(
            "<label>{}<input type=\"tel\" name=\"phone\"></label>\n",
            escape_html(prompt)
        ));
    }
    if let Some(restart) = &view.restart_link {
        body.push_str(&format!(
            "<p><a href=\"{}\">Check this postcode again</a></p>\n",
            escape_html(restart)
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n{}</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(view.title.as_deref().unwrap_or("Postcode checker")),
        STYLE,
        body
    )
}

const STYLE: &str = "<style>\n\
body { font-family: sans-serif; max-width: 40em; margin: 2em auto; }\n\
.notice { padding: 0.75em 1em; margin: 0.5em 0; border-radius: 4px; }\n\
.info { background: #e7f1fb; }\n\
.warning { background: #fdf4dc; }\n\
.error { background: #fbe7e7; }\n\
</style>\n";

/// Escape, then turn `**x**` pairs into `<strong>x</strong>`
fn emphasis_html(text: &str) -> String {
    escape_html(text)
        .split("**")
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 1 {
                format!("<strong>{}</strong>", part)
            } else {
                part.to_string()
            }
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
