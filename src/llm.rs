use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use tracing::debug;

use crate::action::redact_userinfo;
use crate::agent::{AgentError, Decision, Memory, Planner, Thought};
use crate::session::Snapshot;

#[derive(Clone)]
pub struct PlannerConfig {
    pub api_base: String, // e.g. "https://api.openai.com/v1"
    pub api_key: String,  // env OPENAI_API_KEY
    pub model: String,
    pub temperature: f32,
    /// Attach the page screenshot to every request.
    pub use_vision: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_base: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".into()),
            temperature: 0.0,
            use_vision: true,
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a browser automation agent. You complete the user's task one \
action at a time. Each turn you see the current page (URL, title, a list of visible elements and \
possibly a screenshot), your memory of earlier results and the error of the previous action, if any.\n\
Reply with a single JSON object and nothing else, in one of these shapes:\n\
{\"thought\": \"<short plan>\", \"action\": {\"name\": \"<action name>\", \"params\": {...}}}\n\
{\"thought\": \"<short plan>\", \"done\": \"<final summary>\"}\n\
Use exactly the selectors and XPaths given in the task when it provides them. \
Available actions:\n";

#[derive(Clone)]
pub struct OpenAiPlanner {
    http: Client,
    cfg: PlannerConfig,
    catalog: String,
}

impl OpenAiPlanner {
    /// `catalog` is the action list rendered by `Registry::describe`.
    pub fn new(cfg: PlannerConfig, catalog: impl Into<String>) -> Result<Self> {
        if cfg.api_key.is_empty() {
            bail!("OPENAI_API_KEY missing");
        }
        Ok(Self { http: Client::new(), cfg, catalog: catalog.into() })
    }

    fn build_request(
        &self,
        task: &str,
        memory: &Memory,
        snapshot: &Snapshot,
        last_error: Option<&str>,
    ) -> Value {
        let mut page = String::new();
        page.push_str(&format!(
            "Current URL: {}\n",
            snapshot.url.as_deref().map(redact_userinfo).unwrap_or_default()
        ));
        if let Some(title) = &snapshot.title {
            page.push_str(&format!("Title: {title}\n"));
        }
        if let Some(dom) = &snapshot.dom_summary {
            page.push_str("Visible elements:\n");
            page.push_str(dom);
            page.push('\n');
        }
        if !memory.notes.is_empty() {
            page.push_str("Memory:\n");
            for note in &memory.notes {
                page.push_str("- ");
                page.push_str(note);
                page.push('\n');
            }
        }
        if let Some(err) = last_error {
            page.push_str(&format!("Previous action failed: {err}\n"));
        }

        let mut content = vec![
            json!({ "type": "text", "text": format!("Task:\n{task}") }),
            json!({ "type": "text", "text": page }),
        ];
        if self.cfg.use_vision {
            if let Some(b64) = &snapshot.image_base64 {
                content.push(json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/png;base64,{b64}") }
                }));
            }
        }

        json!({
            "model": self.cfg.model,
            "temperature": self.cfg.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": format!("{SYSTEM_PROMPT}{}", self.catalog) },
                { "role": "user", "content": content }
            ]
        })
    }

    async fn complete(&self, req: &Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.cfg.api_base);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(req)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            bail!("OpenAI error {}: {}", status, text);
        }
        let v: Value = serde_json::from_str(&text).context("failed to parse OpenAI response JSON")?;
        v.pointer("/choices/0/message/content")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .context("response has no message content")
    }
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    thought: String,
    #[serde(default)]
    action: Option<RawAction>,
    #[serde(default)]
    done: Option<Value>,
}

#[derive(Deserialize)]
struct RawAction {
    name: String,
    #[serde(default)]
    params: Value,
}

/// Parses the model's JSON reply. Tolerates a surrounding ```json fence.
pub fn parse_reply(content: &str) -> Result<Thought> {
    let body = content.trim();
    let body = body
        .strip_prefix("```json")
        .or_else(|| body.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(body)
        .trim();
    let raw: RawReply = serde_json::from_str(body).context("planner reply is not the expected JSON object")?;

    let decision = match (raw.action, raw.done) {
        (Some(a), _) => Decision::Act { action: a.name, params: a.params },
        (None, Some(Value::String(text))) => Decision::Done { text },
        (None, Some(other)) => Decision::Done { text: other.to_string() },
        (None, None) => bail!("planner reply has neither `action` nor `done`"),
    };
    Ok(Thought { plan: raw.thought, decision })
}

#[async_trait]
impl Planner for OpenAiPlanner {
    async fn think(
        &self,
        task: &str,
        memory: &Memory,
        snapshot: &Snapshot,
        last_error: Option<&str>,
    ) -> Result<Thought, AgentError> {
        let req = self.build_request(task, memory, snapshot, last_error);
        let content = self
            .complete(&req)
            .await
            .map_err(|e| AgentError::Planner(e.to_string()))?;
        debug!(reply = %content, "planner reply");
        parse_reply(&content).map_err(|e| AgentError::Planner(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(use_vision: bool) -> OpenAiPlanner {
        let cfg = PlannerConfig {
            api_base: "http://localhost:0".into(),
            api_key: "test".into(),
            model: "gpt-4.1-mini".into(),
            temperature: 0.0,
            use_vision,
        };
        OpenAiPlanner::new(cfg, "- \"Click Element\": click\n").unwrap()
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            id: "s1".into(),
            url: Some("https://jdoe:pw@time.example.com/OnTheGoTime".into()),
            title: Some("Time".into()),
            image_base64: Some("AAAA".into()),
            dom_summary: Some("[0] <button#submit-btn> Submit".into()),
            captured_at_ms: 0,
        }
    }

    #[test]
    fn parses_action_reply() {
        let t = parse_reply(
            r#"{"thought": "open field", "action": {"name": "Click Element", "params": {"xpath": "//td"}}}"#,
        )
        .unwrap();
        assert_eq!(t.plan, "open field");
        assert_eq!(
            t.decision,
            Decision::Act { action: "Click Element".into(), params: json!({ "xpath": "//td" }) }
        );
    }

    #[test]
    fn parses_fenced_done_reply() {
        let t = parse_reply("```json\n{\"thought\": \"all set\", \"done\": \"Time entered\"}\n```").unwrap();
        assert_eq!(t.decision, Decision::Done { text: "Time entered".into() });
    }

    #[test]
    fn rejects_reply_without_decision() {
        assert!(parse_reply(r#"{"thought": "hmm"}"#).is_err());
        assert!(parse_reply("click the button").is_err());
    }

    #[test]
    fn missing_key_is_an_error() {
        let cfg = PlannerConfig { api_key: String::new(), ..PlannerConfig::default() };
        assert!(OpenAiPlanner::new(cfg, "").is_err());
    }

    #[test]
    fn request_carries_catalog_memory_and_error() {
        let memory = Memory { run_id: "r".into(), notes: vec!["🔗 Navigated to x".into()] };
        let req = planner(false).build_request("fill time", &memory, &snapshot(), Some("boom"));
        let system = req.pointer("/messages/0/content").and_then(|v| v.as_str()).unwrap();
        assert!(system.contains("\"Click Element\""));
        let page = req.pointer("/messages/1/content/1/text").and_then(|v| v.as_str()).unwrap();
        assert!(page.contains("Navigated to x"));
        assert!(page.contains("Previous action failed: boom"));
        assert!(page.contains("https://time.example.com/OnTheGoTime"));
        assert!(!page.contains("jdoe:pw"));
        assert_eq!(req.pointer("/messages/1/content").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn vision_attaches_screenshot() {
        let req = planner(true).build_request("t", &Memory::default(), &snapshot(), None);
        let image = req.pointer("/messages/1/content/2/image_url/url").and_then(|v| v.as_str()).unwrap();
        assert_eq!(image, "data:image/png;base64,AAAA");
    }
}
