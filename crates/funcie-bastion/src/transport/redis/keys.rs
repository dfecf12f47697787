//! Key and channel names.

/// Pub/sub channel carrying messages for `application`.
///
/// # Panics
/// On an empty application id; every message is addressed.
pub fn channel_for_application(base: &str, application: &str) -> String {
    assert!(!application.is_empty(), "application id cannot be empty");
    format!("{base}:app:{application}")
}

/// List the response to `message_id` is pushed onto.
///
/// # Panics
/// On an empty message id; ids are always generated.
pub fn response_key(base: &str, message_id: &str) -> String {
    assert!(!message_id.is_empty(), "message id cannot be empty");
    format!("{base}:resp:{message_id}")
}

/// Recover the application from a channel produced by
/// [`channel_for_application`].
pub fn application_from_channel<'a>(base: &str, channel: &'a str) -> Option<&'a str> {
    channel
        .strip_prefix(base)?
        .strip_prefix(":app:")
        .filter(|app| !app.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(channel_for_application("funcie", "orders"), "funcie:app:orders");
        assert_eq!(response_key("funcie", "42"), "funcie:resp:42");
        assert_eq!(application_from_channel("funcie", "funcie:app:orders"), Some("orders"));
        assert_eq!(application_from_channel("funcie", "funcie:resp:1"), None);
        assert_eq!(application_from_channel("funcie", "funcie"), None);
    }

    #[test]
    #[should_panic(expected = "message id cannot be empty")]
    fn empty_message_id_panics() {
        let _ = response_key("funcie", "");
    }
}
