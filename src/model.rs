use serde::{Deserialize, Serialize};

/// A tweet as returned by the v1.1 API. Only the fields the retrieval loop
/// and the attendance counter look at are typed; everything else is carried
/// through untouched so callers can still serialize the full object.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Tweet {
    pub id: u64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweeted_status: Option<serde_json::Value>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl Tweet {
    pub fn is_retweet(&self) -> bool {
        self.retweeted_status.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_and_keeps_unknown_fields() {
        let raw = json!({
            "id": 42,
            "text": "hello",
            "created_at": "Mon Oct 02 15:30:00 +0000 2017",
            "user": {"screen_name": "someone"},
            "favorite_count": 3
        });
        let tweet: Tweet = serde_json::from_value(raw).unwrap();
        assert_eq!(tweet.id, 42);
        assert!(!tweet.is_retweet());
        assert_eq!(tweet.rest["user"]["screen_name"], "someone");
        assert_eq!(tweet.rest["favorite_count"], 3);
    }

    #[test]
    fn detects_retweets() {
        let raw = json!({
            "id": 7,
            "text": "RT @x: hi",
            "retweeted_status": {"id": 6, "text": "hi"}
        });
        let tweet: Tweet = serde_json::from_value(raw).unwrap();
        assert!(tweet.is_retweet());
    }
}
