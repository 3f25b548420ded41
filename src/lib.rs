pub mod action;
pub mod agent;
pub mod browser;
pub mod config;
pub mod llm;
pub mod registry;
pub mod session;
pub mod task;

pub use action::{click_element, ActionError, ActionResult, ClickSettings, ElementActionParams, Locator};
pub use agent::{Agent, AgentConfig, RunReport, RunStatus};
pub use browser::{BrowserConfig, ChromiumSession};
pub use config::Config;
pub use llm::{OpenAiPlanner, PlannerConfig};
pub use registry::Registry;
pub use session::{BrowserSession, PageDriver, SessionError};
pub use task::TimesheetTask;
