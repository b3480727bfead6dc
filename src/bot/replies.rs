//! Reply texts for commands and purchases.

use crate::channels::OutgoingResponse;
use crate::payments::{CatalogItem, Fulfilment};

pub const WELCOME: &str = "Hello! Welcome to Team Finder Bot! 🎯

Here's what I can do for you:
- /help - Get information about how to use the bot

This bot helps you *build your professional portfolio*, *connect with teammates*, and *showcase your skills*.
You can:

✅ *Set your skills & preferences* to match with the right people.
✅ *Manage your portfolio* by adding completed projects.
✅ *Find team members* whose skills match your project.

The more details you provide, the better the bot can *personalize recommendations* and help you find *ideal team members* for your projects! 🚀";

pub const HELP: &str = "📋 Commands:
/start - Welcome message
/sign_up - Register
/modify - Change your phone number and email
/modify_email - Change your email
/portfolio - Show your portfolio
/add_project - Add completed projects to your portfolio
/set_skills - Add or update skills
/set_preferences - Set work preferences
/profile - View your profile
/find_team - Find team members (free for VIP users)
/about_me - Generate AI summary of your profile (free for VIP users)
/shop - View available purchases
/refund [transaction_id] - Request a refund
/cancel - Cancel the current step";

pub const SHOP: &str = "🛒 Welcome to the Shop!
Select an item to purchase:

👑 VIP Subscription (50 Stars):
- Access to /about_me and /find_team for free for 1 month

Individual purchases:
- Generate profile summary (1 Stars)
- Find team members (3 Stars)";

pub const PAYWALL: &str = "This feature requires payment or VIP subscription.\n\n\
     You can either purchase this feature directly or get a VIP subscription \
     which gives you access to all premium features for 1 month.";

pub const SUMMARY_CREATED: &str =
    "Your AI-generated profile summary has been created. Use /profile to view it.";

pub const PORTFOLIO_EMPTY: &str =
    "📂 Your portfolio is empty.\nUse /add_project to list your first project.";

pub const REFUND_USAGE: &str = "Please provide the transaction ID after the /refund command.\n\
     Example: /refund YOUR_TRANSACTION_ID";
pub const REFUND_SUCCESS: &str =
    "✅ Refund processed successfully!\nThe Stars have been returned to your balance.";
pub const REFUND_FAILED: &str =
    "❌ Refund could not be processed.\nPlease try again later or contact support.";

pub const INVOICE_FAILED: &str = "Sorry, something went wrong while processing your request.";

const THANK_YOU: &str = "Thank you for your purchase! 🎉\n\n";

pub fn portfolio(projects: &str) -> String {
    format!("📂 Your Completed Projects:\n{projects}")
}

/// The `/shop` listing with one button per catalog item.
pub fn shop() -> OutgoingResponse {
    CatalogItem::ALL
        .into_iter()
        .fold(OutgoingResponse::text(SHOP), |resp, item| {
            resp.with_button(item.shop_label(), item.id())
        })
}

/// Purchase offer for a gated command.
pub fn offer(items: &[CatalogItem]) -> OutgoingResponse {
    items
        .iter()
        .fold(OutgoingResponse::text(PAYWALL), |resp, item| {
            resp.with_button(item.offer_label(), item.id())
        })
}

/// Confirmation shown after a purchase was delivered.
pub fn fulfilment(done: &Fulfilment) -> String {
    let body = match done {
        Fulfilment::SummaryGenerated => SUMMARY_CREATED.to_string(),
        Fulfilment::SubscriptionGranted { until } => format!(
            "You now have VIP status until {} with access to all premium features!\n\
             You can use /about_me and /find_team commands for free during your subscription period.",
            until.format("%Y-%m-%d")
        ),
        Fulfilment::TeamFindUnlocked => {
            "Let's find you a team! Please tell me what kind of team you're looking for.".into()
        }
    };
    format!("{THANK_YOU}{body}")
}
