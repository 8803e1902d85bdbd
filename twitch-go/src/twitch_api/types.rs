//! Wire types for the handful of Helix endpoints we call.

use serde::{Deserialize, Serialize};

/// Helix wraps every collection in a `data` array.
///
/// See: <https://dev.twitch.tv/docs/api/guide/#twitch-api-response-pagination>
#[derive(Debug, Deserialize)]
pub struct HelixList<T> {
    pub data: Vec<T>,
}

/// A user from `GET /users`.
///
/// See: <https://dev.twitch.tv/docs/api/reference/#get-users>
#[derive(Debug, Deserialize)]
pub struct User {
    /// Also the broadcaster id for the user's channel.
    pub id: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub display_name: String,
}

/// A category from `GET /games`.
///
/// See: <https://dev.twitch.tv/docs/api/reference/#get-games>
#[derive(Debug, Deserialize)]
pub struct Game {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Body of `PATCH /channels`.
///
/// Every field we send overwrites the channel's current value, so sending the same update twice
/// is harmless.
///
/// See: <https://dev.twitch.tv/docs/api/reference/#modify-channel-information>
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelUpdate<'a> {
    pub title: &'a str,
    pub game_id: &'a str,
    /// Left out entirely when the preset has no tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<&'a [String]>,
}

impl<'a> ChannelUpdate<'a> {
    pub fn new(title: &'a str, game_id: &'a str, tags: &'a [String]) -> Self {
        Self {
            title,
            game_id,
            tags: (!tags.is_empty()).then_some(tags),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_tags_are_omitted() {
        let update = ChannelUpdate::new("Ranked grind", "516575", &[]);
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            json!({"title": "Ranked grind", "game_id": "516575"})
        );

        let tags = vec!["FPS".to_string()];
        let update = ChannelUpdate::new("Ranked grind", "516575", &tags);
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            json!({"title": "Ranked grind", "game_id": "516575", "tags": ["FPS"]})
        );
    }
}
