//! Live tab used for multi-step interaction (chat, indexing requests).

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::chat::ChatSurface;
use crate::indexing::IndexingSurface;
use crate::{Error, Result};

const POLL: Duration = Duration::from_millis(250);
const SUBMIT_SETTLE: Duration = Duration::from_secs(1);

/// The chat panel is open when this matches.
const CHAT_OPEN: &str = "chat.is-open";
/// Button that toggles the chat panel.
const CHAT_TOGGLE: &str = "chat-toggle button";

const CHAT_INPUTS: &[&str] = &[
    "textarea[data-test-id='chat-input']",
    "textarea#message-textarea",
    "textarea[placeholder*='Ask about this repository']",
    "new-message-form textarea",
    "chat textarea",
];

const SUBMIT_BUTTONS: &[&str] = &[
    "button[data-test-id='send-message-button']",
    "button[aria-label='Send message']",
    "new-message-form button[type='submit']",
    "chat .send-button",
];

const ANSWER_ELEMENTS: &[&str] = &[
    "chat .cdk-virtual-scroll-content-wrapper documentation-markdown",
    "chat .cdk-virtual-scroll-content-wrapper",
    "chat thread",
];

/// Placeholder shown before the first answer token arrives.
const CHAT_EMPTY_STATE: &str = "chat .empty-house-container";

const URL_INPUTS: &[&str] = &[
    "input[aria-label='Enter URL']",
    "input[placeholder*='URL']",
    "dialog input",
    "[role='dialog'] input",
    "mat-dialog-container input",
];

const VISIBLE_FN: &str = "const visible = (el) => !!el && \
    (el.offsetWidth > 0 || el.offsetHeight > 0 || el.getClientRects().length > 0);";

/// Open tab handed to interaction code.
pub struct InteractivePage {
    page: Page,
    input_selector: Option<&'static str>,
}

impl InteractivePage {
    pub(crate) const fn new(page: Page) -> Self {
        Self {
            page,
            input_selector: None,
        }
    }

    /// Run `script` and decode its result; `null` and `undefined` are `None`.
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<Option<T>> {
        let result = self.page.evaluate(script).await?;
        decode_script_value(result.value())
    }

    async fn first_visible(&self, selectors: &[&'static str]) -> Result<Option<&'static str>> {
        let list = serde_json::to_string(selectors)?;
        let index = self
            .eval::<usize>(format!(
                "(() => {{ {VISIBLE_FN} const sels = {list}; \
                 const i = sels.findIndex((s) => visible(document.querySelector(s))); \
                 return i < 0 ? null : i; }})()"
            ))
            .await?;
        Ok(selector_at(selectors, index))
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let sel = serde_json::to_string(selector)?;
        let found = self.eval(format!("document.querySelector({sel}) !== null")).await?;
        Ok(found.unwrap_or(false))
    }

    async fn ensure_chat_open(&self) -> Result<()> {
        if self.exists(CHAT_OPEN).await? {
            return Ok(());
        }
        match self.page.find_element(CHAT_TOGGLE).await {
            Ok(toggle) => {
                toggle.click().await?;
                debug!("opened chat panel");
            },
            Err(_) => debug!("chat toggle not found; assuming inline chat"),
        }
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        let sel = serde_json::to_string(selector)?;
        let value = self
            .eval::<String>(format!(
                "(() => {{ const el = document.querySelector({sel}); return el ? (el.value || '') : ''; }})()"
            ))
            .await?;
        Ok(value.unwrap_or_default())
    }

    fn button_script(label: &str, action: &str) -> Result<String> {
        let label = serde_json::to_string(&label.to_lowercase())?;
        Ok(format!(
            "(() => {{ {VISIBLE_FN} \
             const b = [...document.querySelectorAll('button')] \
               .find((b) => visible(b) && b.innerText.trim().toLowerCase() === {label}); \
             {action} }})()"
        ))
    }
}

#[async_trait(?Send)]
impl ChatSurface for InteractivePage {
    async fn wait_for_input(&mut self, timeout: Duration) -> Result<bool> {
        self.ensure_chat_open().await?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(selector) = self.first_visible(CHAT_INPUTS).await? {
                debug!(selector, "chat input ready");
                self.input_selector = Some(selector);
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn submit_question(&mut self, question: &str) -> Result<()> {
        let selector = self.input_selector.unwrap_or(CHAT_INPUTS[0]);
        let input = self.page.find_element(selector).await?;
        input.click().await?;
        input.type_str(question).await?;
        input.press_key("Enter").await?;
        tokio::time::sleep(SUBMIT_SETTLE).await;

        // Enter did not submit: fall back to the send button.
        if !self.input_value(selector).await?.trim().is_empty() {
            if let Some(button) = self.first_visible(SUBMIT_BUTTONS).await? {
                self.page.find_element(button).await?.click().await?;
                debug!(button, "submitted via send button");
            }
        }
        Ok(())
    }

    async fn sample_answer(&mut self) -> Result<Option<String>> {
        let empty = serde_json::to_string(CHAT_EMPTY_STATE)?;
        let answers = serde_json::to_string(ANSWER_ELEMENTS)?;
        let text = self
            .eval::<String>(format!(
                "(() => {{ {VISIBLE_FN} \
                 if (visible(document.querySelector({empty}))) return null; \
                 for (const s of {answers}) {{ \
                   const all = document.querySelectorAll(s); \
                   const el = all[all.length - 1]; \
                   if (visible(el) && el.innerText.trim()) return el.innerText; \
                 }} \
                 return null; }})()"
            ))
            .await?;
        Ok(text.filter(|t| !t.trim().is_empty()))
    }
}

#[async_trait(?Send)]
impl IndexingSurface for InteractivePage {
    async fn wait_for_button(&mut self, label: &str, timeout: Duration) -> Result<bool> {
        let script = Self::button_script(label, "return !!b;")?;
        let deadline = Instant::now() + timeout;
        loop {
            if self.eval::<bool>(script.clone()).await?.unwrap_or(false) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn button_enabled(&mut self, label: &str) -> Result<bool> {
        let enabled = self
            .eval(Self::button_script(label, "return !!b && !b.disabled;")?)
            .await?;
        Ok(enabled.unwrap_or(false))
    }

    async fn click_button(&mut self, label: &str) -> Result<bool> {
        let clicked = self
            .eval(Self::button_script(
                label,
                "if (!b || b.disabled) return false; b.click(); return true;",
            )?)
            .await?;
        Ok(clicked.unwrap_or(false))
    }

    async fn fill_url_input(&mut self, value: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(selector) = self.first_visible(URL_INPUTS).await? {
                let input = self.page.find_element(selector).await?;
                input.click().await?;
                input.type_str(value).await?;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL).await;
        }
    }

    async fn body_text(&mut self) -> Result<String> {
        let text = self
            .eval::<String>("document.body ? document.body.innerText : ''".to_string())
            .await?;
        Ok(text.unwrap_or_default())
    }
}

/// Decode a script's return value. CDP omits the value for `undefined` and
/// sends JSON `null` for `null`; both decode to `None`.
fn decode_script_value<T: DeserializeOwned>(value: Option<&Value>) -> Result<Option<T>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| Error::Driver(format!("unexpected script result: {e}"))),
    }
}

/// Selector at the index a visibility script reported.
fn selector_at(selectors: &[&'static str], index: Option<usize>) -> Option<&'static str> {
    index.and_then(|i| selectors.get(i).copied())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chromiumoxide::cdp::js_protocol::runtime::RemoteObject;
    use chromiumoxide::js::EvaluationResult;
    use serde_json::json;

    #[test]
    fn test_null_remote_object_decodes_to_none() {
        let object: RemoteObject =
            serde_json::from_str(r#"{"type":"object","subtype":"null","value":null}"#).unwrap();
        let result = EvaluationResult::new(object);

        let decoded: Option<String> = decode_script_value(result.value()).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_missing_and_null_values_are_none() {
        assert_eq!(decode_script_value::<usize>(None).unwrap(), None);
        assert_eq!(decode_script_value::<bool>(Some(&Value::Null)).unwrap(), None);
    }

    #[test]
    fn test_empty_string_is_kept() {
        let decoded: Option<String> = decode_script_value(Some(&json!(""))).unwrap();
        assert_eq!(decoded.as_deref(), Some(""));
    }

    #[test]
    fn test_index_selects_the_matching_selector() {
        let index: Option<usize> = decode_script_value(Some(&json!(2))).unwrap();
        assert_eq!(selector_at(URL_INPUTS, index), Some("dialog input"));
        assert_eq!(selector_at(URL_INPUTS, Some(99)), None);
        assert_eq!(selector_at(URL_INPUTS, None), None);
    }

    #[test]
    fn test_mismatched_type_is_a_driver_error() {
        let err = decode_script_value::<usize>(Some(&json!("two"))).unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
    }
}
