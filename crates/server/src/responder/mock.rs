// Scripted demo responder
//
// Rule table for the property-search demo flow. Rules are checked in order;
// the first match wins. Text that matches nothing gets the fallback line;
// non-text events without a rule get no reply.

use async_trait::async_trait;
use parley_core::ids::new_message_id;
use parley_core::{
    ActionScope, ChatAction, ChatEvent, EventType, MessageType, Payload, ReplyType, Responder,
    Result, Sender, StoredEvent, Visibility,
};
use serde_json::{json, Value};

/// Sender id of every scripted reply
pub const BOT_ID: &str = "re_bot";

pub const FALLBACK_TEXT: &str = "Can't help you with that, do you need anything else?";

#[derive(Debug, Clone, Default)]
pub struct MockResponder;

impl MockResponder {
    pub fn new() -> Self {
        Self
    }

    fn reply(&self, latest: &ChatEvent) -> Vec<ChatEvent> {
        let payload = &latest.payload;
        let data = payload.data();
        let field = |key: &str| data.and_then(|d| d.get(key)).and_then(Value::as_str);

        match payload.message_type {
            MessageType::Analytics if field("action") == Some("logged_in") => logged_in(),
            MessageType::UserAction => match field("actionId") {
                Some("logged_in") => logged_in(),
                Some("shortlist") => vec![login_screen()],
                Some("contact") => vec![seller_info()],
                _ if field("selectedId").is_some() => vec![locality_info()],
                _ => Vec::new(),
            },
            MessageType::Text if latest.event_type == EventType::Message => match payload.text() {
                Some(text) if !text.trim().is_empty() => vec![reply_to_text(text)],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn respond(&self, latest: &ChatEvent, _history: &[StoredEvent]) -> Result<Vec<ChatEvent>> {
        Ok(self.reply(latest))
    }

    fn name(&self) -> &'static str {
        "MockResponder"
    }
}

fn reply_to_text(text: &str) -> ChatEvent {
    if matches_any(text, &["hi", "hello", "hey"]) {
        return bot(
            MessageType::Markdown,
            json!({
                "text": "Hey! I see you're looking for **residential properties** to **buy**. How can I help?"
            }),
        );
    }
    if matches_any(text, &["show me properties", "properties", "list"]) {
        return property_carousel();
    }
    if matches_any(text, &["where this seller lives", "seller lives", "address"]) {
        return bot(MessageType::Text, json!({ "text": FALLBACK_TEXT }));
    }
    if matches_any(text, &["sector 32"]) {
        return list_selection(
            "### Which sector 32 are you referring to?",
            json!([
                { "id": "uuid1", "title": "sector 32 gurgaon" },
                { "id": "uuid2", "title": "sector 32 faridabad" }
            ]),
            "**Which sector 32 are you referring to?**: sector 32 gurgaon or sector 32 faridabad",
        );
    }
    if matches_any(text, &["faridabad"]) {
        return list_selection(
            "### Are you looking for rent or buy? or don't care, and what generic info about locality?",
            json!([
                { "id": "rent_id", "title": "rent" },
                { "id": "buy_id", "title": "buy" },
                { "id": "dont_care", "title": "dont care" }
            ]),
            "**Are you looking for rent or buy? or don't care?**",
        );
    }
    bot(MessageType::Text, json!({ "text": FALLBACK_TEXT }))
}

/// Loose match: either side contains the other, case-insensitive.
fn matches_any(text: &str, options: &[&str]) -> bool {
    let text = text.trim().to_lowercase();
    options.iter().any(|option| {
        let option = option.trim().to_lowercase();
        text.contains(&option) || option.contains(&text)
    })
}

fn bot(message_type: MessageType, content: Value) -> ChatEvent {
    let mut payload = Payload::new(message_type, content);
    payload.message_id = Some(new_message_id());
    ChatEvent::new(EventType::Message, Sender::bot(BOT_ID), payload)
}

fn with_actions(mut event: ChatEvent, actions: Vec<ChatAction>) -> ChatEvent {
    event.payload.actions = Some(actions);
    event
}

fn action(id: &str, label: &str, reply_type: ReplyType, scope: ActionScope) -> ChatAction {
    ChatAction {
        id: id.to_string(),
        label: label.to_string(),
        reply_type,
        scope,
    }
}

fn logged_in() -> Vec<ChatEvent> {
    let mut notice = bot(MessageType::Text, json!({ "text": "Logged in successfully" }));
    notice.event_type = EventType::Info;
    notice.payload.visibility = Some(Visibility::Shown);
    vec![
        notice,
        bot(MessageType::Text, json!({ "text": "Shortlisted this property" })),
    ]
}

fn login_screen() -> ChatEvent {
    bot(
        MessageType::Template,
        json!({
            "preText": "You need to login first.",
            "templateId": "login_screen",
            "data": {},
            "fallbackText": "Please enter your phone number, so that I can send OTP for login"
        }),
    )
}

fn seller_info() -> ChatEvent {
    let (name, phone) = ("Nadeem", "+9198989898");
    with_actions(
        bot(
            MessageType::Template,
            json!({
                "preText": format!("### Here are contact details of **{name}**"),
                "templateId": "seller_info",
                "data": {
                    "id": "s1",
                    "name": name,
                    "image": "https://images.unsplash.com/photo-1472099645785-5658abf4ff4e?w=100",
                    "phone": phone
                },
                "fallbackText": format!("**Here are contact details of {name}.** [Call {phone}](tel:{phone})")
            }),
        ),
        vec![action("call_now", "Call Now", ReplyType::Hidden, ActionScope::Message)],
    )
}

fn locality_info() -> ChatEvent {
    let highlights = ["Near Metro", "Schools & Hospitals nearby"];
    let pros = ["Good connectivity", "Affordable"];
    let cons = ["Traffic in peak hours"];
    let description = "Sector 32 is a bustling locality in Faridabad with a population of 25K.";
    let trend = "+5.2% in last 1 year";
    with_actions(
        bot(
            MessageType::Template,
            json!({
                "preText": "### Here's all you need to know about sector 32 faridabad",
                "templateId": "locality_info",
                "data": {
                    "id": "l1",
                    "name": "Sector 32",
                    "city": "Faridabad",
                    "image": "https://images.unsplash.com/photo-1449824913935-59a10b8d2000?w=400",
                    "description": description,
                    "highlights": highlights,
                    "pros": pros,
                    "cons": cons,
                    "priceTrend": 5.2,
                    "priceTrendLabel": trend
                },
                "fallbackText": format!(
                    "**Here's all you need to know about Sector 32 Faridabad.** {description} Few highlights: {}. Pros: {}. Cons: {}. Price trend: {trend}.",
                    highlights.join(", "),
                    pros.join(", "),
                    cons.join(", ")
                )
            }),
        ),
        vec![action("show_reviews", "Show review", ReplyType::Visible, ActionScope::Message)],
    )
}

fn property_carousel() -> ChatEvent {
    with_actions(
        bot(
            MessageType::Template,
            json!({
                "preText": "### Properties you may like",
                "templateId": "property_carousel",
                "data": {
                    "properties": [
                        { "id": "p1", "title": "2BHK · 80L" },
                        { "id": "p2", "title": "3BHK · 70L" }
                    ]
                },
                "fallbackText": "**P1**: 2BHK · 80L  **P2**: 3BHK · 70L",
                "followUpText": "<i>Tap a card to take action</i>"
            }),
        ),
        vec![
            action("shortlist", "Shortlist", ReplyType::Visible, ActionScope::TemplateItem),
            action("contact", "Contact Seller", ReplyType::Visible, ActionScope::TemplateItem),
        ],
    )
}

fn list_selection(pre_text: &str, options: Value, fallback: &str) -> ChatEvent {
    bot(
        MessageType::Template,
        json!({
            "preText": pre_text,
            "templateId": "list_selection",
            "data": { "properties": options },
            "fallbackText": fallback,
            "followUpText": "<i>Select a card to take action</i>"
        }),
    )
}
