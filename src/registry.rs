use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::info;

use crate::action::{
    self, ActionError, ActionResult, ClickSettings, ElementActionParams, GoToUrlParams,
    InputTextParams, WaitParams,
};
use crate::session::BrowserSession;

pub const CLICK_ELEMENT: &str = "Click Element";
pub const INPUT_TEXT: &str = "Input Text";
pub const GO_TO_URL: &str = "Go To URL";
pub const WAIT: &str = "Wait";

/// A named operation the planner can invoke with JSON parameters.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the parameter object.
    fn parameters(&self) -> Value;
    async fn execute(
        &self,
        params: Value,
        session: &dyn BrowserSession,
    ) -> Result<ActionResult, ActionError>;
}

fn parse_params<T: DeserializeOwned>(action: &str, params: Value) -> Result<T, ActionError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| {
        ActionError::InvalidArgument(format!("invalid parameters for '{action}': {e}"))
    })
}

fn element_schema() -> Value {
    json!({
        "index": { "type": "integer", "description": "Index of the element from the agent's observation" },
        "selector": { "type": "string", "description": "CSS selector for the target element" },
        "xpath": { "type": "string", "description": "XPath selector for the target element" },
        "description": { "type": "string", "description": "Optional description of the element for logging/clarity" }
    })
}

pub struct ClickElement {
    settings: ClickSettings,
}

impl ClickElement {
    pub fn new(settings: ClickSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Action for ClickElement {
    fn name(&self) -> &'static str {
        CLICK_ELEMENT
    }

    fn description(&self) -> &'static str {
        "Click the element identified by an XPath (preferred when given) or a CSS selector"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": element_schema() })
    }

    async fn execute(
        &self,
        params: Value,
        session: &dyn BrowserSession,
    ) -> Result<ActionResult, ActionError> {
        let params: ElementActionParams = parse_params(CLICK_ELEMENT, params)?;
        action::click_element(&params, session, &self.settings).await
    }
}

pub struct InputText;

#[async_trait]
impl Action for InputText {
    fn name(&self) -> &'static str {
        INPUT_TEXT
    }

    fn description(&self) -> &'static str {
        "Clear an input field located by XPath or CSS selector and type text into it, optionally pressing Enter"
    }

    fn parameters(&self) -> Value {
        let mut props = element_schema();
        props["text"] = json!({ "type": "string", "description": "Text to type" });
        props["press_enter"] = json!({ "type": "boolean", "description": "Press Enter after typing" });
        json!({ "type": "object", "properties": props, "required": ["text"] })
    }

    async fn execute(
        &self,
        params: Value,
        session: &dyn BrowserSession,
    ) -> Result<ActionResult, ActionError> {
        let params: InputTextParams = parse_params(INPUT_TEXT, params)?;
        action::input_text(&params, session).await
    }
}

pub struct GoToUrl;

#[async_trait]
impl Action for GoToUrl {
    fn name(&self) -> &'static str {
        GO_TO_URL
    }

    fn description(&self) -> &'static str {
        "Navigate the current tab to a URL"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        params: Value,
        session: &dyn BrowserSession,
    ) -> Result<ActionResult, ActionError> {
        let params: GoToUrlParams = parse_params(GO_TO_URL, params)?;
        action::go_to_url(&params, session).await
    }
}

pub struct Wait;

#[async_trait]
impl Action for Wait {
    fn name(&self) -> &'static str {
        WAIT
    }

    fn description(&self) -> &'static str {
        "Pause for a number of seconds (at most 30)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "seconds": { "type": "number", "default": 3 } }
        })
    }

    async fn execute(
        &self,
        params: Value,
        _session: &dyn BrowserSession,
    ) -> Result<ActionResult, ActionError> {
        let params: WaitParams = parse_params(WAIT, params)?;
        action::wait(&params).await
    }
}

/// Ordered set of actions; the order is the order shown to the planner.
#[derive(Default)]
pub struct Registry {
    actions: Vec<Box<dyn Action>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(click: ClickSettings) -> Self {
        let mut registry = Self::new();
        registry.register(GoToUrl);
        registry.register(ClickElement::new(click));
        registry.register(InputText);
        registry.register(Wait);
        registry
    }

    /// Registering a name twice replaces the earlier action in place.
    pub fn register<A: Action + 'static>(&mut self, action: A) {
        match self.actions.iter().position(|a| a.name() == action.name()) {
            Some(i) => self.actions[i] = Box::new(action),
            None => self.actions.push(Box::new(action)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Action> {
        self.actions
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// Catalog of actions for the planner prompt.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for a in &self.actions {
            out.push_str(&format!(
                "- \"{}\": {}. Parameters: {}\n",
                a.name(),
                a.description(),
                a.parameters()
            ));
        }
        out
    }

    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        session: &dyn BrowserSession,
    ) -> Result<ActionResult, ActionError> {
        let action = self
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;
        info!(action = name, "executing action");
        action.execute(params, session).await
    }
}
