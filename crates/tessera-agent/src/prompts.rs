/// System prompt for thread title generation
pub const TITLE_PROMPT: &str = "
- you will generate a short title based on the first message a user begins a conversation with
- ensure it is not more than 80 characters long
- the title should be a summary of the user's message
- do not use quotes or colons";

/// System prompt for prior-context classification; the current date is appended
pub const CONTEXT_PROMPT: &str = "
Analyze this message to determine if the user is referring to a previous conversation with the LLM.
Specifically, identify if the user wants to reference specific information from that chat or if they want the LLM to use the previous chat messages as context for the current conversation.
Extract any date ranges mentioned in the user message that could help identify the previous chat.
Return dates in ISO format.
If no specific dates are mentioned but time periods are (like \"last week\" or \"past month\"), calculate the appropriate date range.
For the end date, return the date 1 day after the end of the time period.
Today's date is ";

pub fn context_prompt(today: &str) -> String {
    format!("{}{}", CONTEXT_PROMPT, today)
}
