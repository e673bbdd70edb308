//! Page events forwarded to a bot.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    /// `console.error(...)` in the page.
    ConsoleError { args: Vec<String> },
    /// A page script called an exposed binding.
    BindingCalled { name: String, payload: String },
    /// A download finished.
    DownloadCompleted { id: String },
    /// Uncaught exception in a page script.
    ExceptionThrown { message: String },
}

impl BrowserEvent {
    /// Translate a raw DevTools event. Returns `None` for events bots ignore.
    pub fn from_cdp(method: &str, params: &Value) -> Option<Self> {
        match method {
            "Runtime.consoleAPICalled" => {
                if params.get("type").and_then(Value::as_str) != Some("error") {
                    return None;
                }
                let args = params
                    .get("args")
                    .and_then(Value::as_array)
                    .map(|args| args.iter().map(remote_object_text).collect())
                    .unwrap_or_default();
                Some(Self::ConsoleError { args })
            }
            "Runtime.bindingCalled" => Some(Self::BindingCalled {
                name: str_field(params, "name"),
                payload: str_field(params, "payload"),
            }),
            "Browser.downloadProgress" => {
                if params.get("state").and_then(Value::as_str) != Some("completed") {
                    return None;
                }
                Some(Self::DownloadCompleted {
                    id: str_field(params, "guid"),
                })
            }
            "Runtime.exceptionThrown" => {
                let details = params.get("exceptionDetails");
                let text = details
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let description = details
                    .and_then(|d| d.get("exception"))
                    .and_then(|e| e.get("description"))
                    .and_then(Value::as_str);
                let message = match description {
                    Some(desc) if !text.is_empty() => format!("{} {}", text, desc),
                    Some(desc) => desc.to_string(),
                    None => text.to_string(),
                };
                Some(Self::ExceptionThrown { message })
            }
            _ => None,
        }
    }
}

fn str_field(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn remote_object_text(arg: &Value) -> String {
    if let Some(value) = arg.get("value") {
        return match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    arg.get("description")
        .and_then(Value::as_str)
        .or_else(|| arg.get("type").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}
