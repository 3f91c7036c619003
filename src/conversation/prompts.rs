//! User-facing reply texts.

pub const WELCOME: &str = "🍪 Welcome to the Fortune Cookie!\n\n\
    Tap a button below or send /cookie to get the wisdom of the day.";

pub const HELP: &str = "Commands:\n\
    /cookie - a random fortune\n\
    /start - show the menu\n\n\
    Or use the buttons: 🥠 Random, 🔢 By number.";

pub const USE_MENU: &str = "Please use the menu buttons below 👇";

pub const NOT_A_NUMBER: &str = "Please enter a whole number, try again.";

/// Ask for an index in `1..=len`.
pub fn ask_for_index(len: usize) -> String {
    format!("Enter a number between 1 and {len}.")
}

/// Re-prompt after an out-of-range index.
pub fn index_out_of_range(len: usize) -> String {
    format!("The number must be between 1 and {len}, try again.")
}
