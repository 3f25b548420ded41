//! The timesheet run: fixed form selectors and the step-by-step instructions
//! handed to the planner.

use chrono::{Local, NaiveDate};

use crate::action::redact_userinfo;
use crate::registry::{CLICK_ELEMENT, INPUT_TEXT};

pub const ASSIGNMENT_FIELD_XPATH: &str = "//div[contains(@class, 'formElement') and contains(@class, 'fieldFormElement') and .//div[@id='Assignment']]";
pub const ASSIGNMENT_OPTION_XPATH: &str = "//li[contains(@class, 'mru-item') and .//div[contains(@class, 'code-text') and normalize-space()='(9996610)'] and .//div[contains(@class, 'secondary-text') and contains(., '96410')]]";
pub const DURATION_FIELD_XPATH: &str = "//div[contains(@class, 'formElement') and contains(@class, 'fieldFormElement') and .//div[@id='BaseHours']]";
pub const LOCATION_FIELD_XPATH: &str = "//div[contains(@class, 'formElement') and contains(@class, 'fieldFormElement') and .//div[@id='Location']]";
pub const DURATION_KEYPAD_8_XPATH: &str = "//div[@id='durationPicker']//td[contains(@class, 'duration-picker-gray-background') and normalize-space()='8']";
pub const DURATION_DONE_XPATH: &str = "//td[@id='durationAllowNegativeSaveButton']";
pub const SEARCH_INPUT_SELECTOR: &str = "#search-control-input";
pub const LOCATION_OPTION_XPATH: &str = "//li[.//div[contains(@class, 'code-text') and normalize-space()='(PA87)']]";
pub const SUBMIT_BUTTON_XPATH: &str = "//button[@id='submit-btn']";

pub const DATE_FORMAT: &str = "%m-%d-%Y";

#[derive(Clone, Debug)]
pub struct TimesheetTask {
    pub start_url: String,
    pub today: NaiveDate,
    pub location: String,
    pub assignment_code: String,
}

impl TimesheetTask {
    pub fn new(start_url: impl Into<String>, today: NaiveDate, location: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            today,
            location: location.into(),
            assignment_code: "9996610".to_string(),
        }
    }

    /// Same as `new`, dated with the local calendar day.
    pub fn for_today(start_url: impl Into<String>, location: impl Into<String>) -> Self {
        Self::new(start_url, Local::now().date_naive(), location)
    }

    pub fn today_label(&self) -> String {
        self.today.format(DATE_FORMAT).to_string()
    }

    /// Renders the instructions. Credentials in the start URL are never included;
    /// the browser is expected to be on that URL already.
    pub fn render(&self) -> String {
        let today = self.today_label();
        let url = redact_userinfo(&self.start_url);
        let code = &self.assignment_code;
        let location = &self.location;
        format!(
            "\
Objective: Input my time into the CMS tracker for my work. Today's date is {today}.

Starting URL: {url}

Instructions:
1.  The browser is already on the starting URL and authentication is handled by the URL. Wait for the main time entry page to load.
2.  Verify the displayed date is correct for today ({today}). If not, adjust it.
3.  **Activate the Client/Assignment field:** Use the '{CLICK_ELEMENT}' action, providing the specific XPath `{ASSIGNMENT_FIELD_XPATH}` in the `xpath` parameter. Click this specific field container to reveal the search input.
4.  **Input Client/Assignment Search Text:** Wait for the search input field to appear. Use the '{INPUT_TEXT}' action to type '{code}' into the input field identified by the CSS selector `{SEARCH_INPUT_SELECTOR}` and placeholder of \"Client / Assignment\", set `press_enter` to true, then use the 'Wait' action for 2 seconds.
5.  **Select Client/Assignment Option:** Wait for the dropdown list of results to appear. Use the '{CLICK_ELEMENT}' action, providing the specific XPath `{ASSIGNMENT_OPTION_XPATH}` in the `xpath` parameter, and set the description to 'Click dropdown option with code ({code})'.
6.  **Activate Duration field:** Use the '{CLICK_ELEMENT}' action, providing the specific XPath `{DURATION_FIELD_XPATH}` in the `xpath` parameter. Click this specific field container to reveal the duration input.
7.  **Input Duration '8' via Keypad:** Inside the duration picker popup: first, use the '{CLICK_ELEMENT}' action with XPath `{DURATION_KEYPAD_8_XPATH}` to click the '8' button. Second, use the '{CLICK_ELEMENT}' action with XPath `{DURATION_DONE_XPATH}` to click the 'Done' button.
8.  **Activate Location field:** Use the '{CLICK_ELEMENT}' action, providing the specific XPath `{LOCATION_FIELD_XPATH}` in the `xpath` parameter. Click this specific field container to reveal the location input.
9.  **Input and Select Location:** First, use the '{INPUT_TEXT}' action to type '{location}' into the location search input field (selector `{SEARCH_INPUT_SELECTOR}`). Second, wait for the dropdown list and use the '{CLICK_ELEMENT}' action with XPath `{LOCATION_OPTION_XPATH}` to select the 'PA Philadelphia - Philadelphia (PA87)' option.
10. **Submit:** Click the submit button with the '{CLICK_ELEMENT}' action, providing the specific XPath `{SUBMIT_BUTTON_XPATH}` in the `xpath` parameter.
"
        )
    }
}
