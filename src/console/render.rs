use crate::ansi;
use crate::disposition::submitter::{ProxyError, SubmitReceipt};
use crate::disposition::DispositionCode;
use crate::provider::ProviderError;
use crate::session::{CallDetails, SessionError, SessionSnapshot};

/// `m:ss`, e.g. `1:05`.
pub fn duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// One line explaining a failed action, worded by where it failed.
pub fn error(err: &SessionError) -> String {
    match err {
        SessionError::Validation(e) => format!("{} {e}", ansi::yellow("!")),
        SessionError::Provider(ProviderError::ResolutionTimeout { attempts }) => format!(
            "{} Call placed but never became live ({attempts} status checks). Check the provider dashboard.",
            ansi::red("\u{2717}")
        ),
        SessionError::Provider(e) => format!(
            "{} Provider: {}",
            ansi::red("\u{2717}"),
            e.agent_message()
        ),
        SessionError::Proxy(ProxyError::Rejected(msg)) => format!(
            "{} Disposition not saved: {msg}. Try again.",
            ansi::red("\u{2717}")
        ),
        SessionError::Proxy(e) => format!(
            "{} Disposition not saved ({e}). Try again.",
            ansi::red("\u{2717}")
        ),
        SessionError::InvalidState { .. } | SessionError::CommandInFlight(_) => {
            format!("{} {err}", ansi::yellow("!"))
        }
        SessionError::Cancelled => ansi::dim("Cancelled"),
    }
}

pub fn snapshot(snap: &SessionSnapshot) -> String {
    let mut out = format!("  State: {}", ansi::bold(&snap.state.to_string()));
    if let Some(ref call) = snap.call {
        out.push('\n');
        out.push_str(&call_summary(call));
    }
    out
}

pub fn call_summary(call: &CallDetails) -> String {
    let name = if call.customer_name.is_empty() {
        "Unknown"
    } else {
        &call.customer_name
    };
    let mut lines = vec![
        format!("  Call:     {}", call.call_id),
        format!("  Customer: {name} ({})", call.phone_number),
        format!("  Listen:   {}", ansi::dim(&call.listen_url)),
    ];
    if let Some(ref by) = call.ended_by {
        lines.push(format!("  Ended by: {by}"));
    }
    if let Some(secs) = call.duration {
        lines.push(format!("  Duration: {}", duration(secs)));
    }
    lines.join("\n")
}

pub fn codes() -> String {
    DispositionCode::ALL
        .iter()
        .enumerate()
        .map(|(i, code)| format!("  {:>2}. {:<20} {}", i + 1, code.code(), ansi::dim(code.label())))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn receipt(receipt: &SubmitReceipt) -> String {
    let mut out = format!(
        "  {} {}",
        ansi::green("\u{2713}"),
        receipt
            .message
            .as_deref()
            .unwrap_or("Disposition submitted")
    );
    if let Some(ref err) = receipt.webhook_error {
        out.push_str(&format!("\n  {} {}", ansi::yellow("!"), ansi::dim(err)));
    }
    out
}
