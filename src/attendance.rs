//! Attendance counting: scan collected tweets for a course hashtag and
//! bucket each match into the lecture session whose window contains it.

use crate::model::Tweet;
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDateTime};

/// v1.1 `created_at` format, e.g. `Mon Oct 02 15:30:00 +0000 2017`.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";
const SESSION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_created_at(raw: &str) -> anyhow::Result<NaiveDateTime> {
    let parsed = DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .with_context(|| format!("Unparseable created_at: {raw}"))?;
    Ok(parsed.naive_utc())
}

/// One lecture's tweeting window, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub opens: NaiveDateTime,
    pub closes: NaiveDateTime,
}

impl Session {
    /// Strictly between both ends; a tweet exactly on a boundary counts for
    /// neither adjacent session.
    fn contains(&self, at: NaiveDateTime) -> bool {
        at > self.opens && at < self.closes
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    sessions: Vec<Session>,
}

impl Schedule {
    /// Parse a schedule file: one `start..end` line per session in
    /// `%Y-%m-%d %H:%M:%S` (UTC). Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut sessions = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (start, end) = line
                .split_once("..")
                .with_context(|| format!("Session line is missing '..': {line}"))?;
            let opens = NaiveDateTime::parse_from_str(start.trim(), SESSION_FORMAT)
                .with_context(|| format!("Bad session start: {start}"))?;
            let closes = NaiveDateTime::parse_from_str(end.trim(), SESSION_FORMAT)
                .with_context(|| format!("Bad session end: {end}"))?;
            if closes <= opens {
                bail!("Session ends before it starts: {line}");
            }
            sessions.push(Session { opens, closes });
        }
        if sessions.is_empty() {
            bail!("Schedule contains no sessions");
        }
        Ok(Self { sessions })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Index of the first session containing `at`.
    fn bucket(&self, at: NaiveDateTime) -> Option<usize> {
        self.sessions.iter().position(|s| s.contains(at))
    }
}

/// Per-session tally for one user's collected tweets.
pub struct Register {
    hashtag: String,
    schedule: Schedule,
    counts: Vec<u64>,
    tagged: u64,
}

impl Register {
    pub fn new(hashtag: impl Into<String>, schedule: Schedule) -> Self {
        let counts = vec![0; schedule.session_count()];
        Self {
            hashtag: hashtag.into(),
            schedule,
            counts,
            tagged: 0,
        }
    }

    /// Count `tweet` if its text carries the hashtag. Matches outside every
    /// session window still count toward `tagged` but land in no bucket.
    pub fn record(&mut self, tweet: &Tweet) -> anyhow::Result<()> {
        if !tweet.text.contains(&self.hashtag) {
            return Ok(());
        }
        self.tagged += 1;
        let raw = tweet
            .created_at
            .as_deref()
            .context("Tagged tweet is missing created_at")?;
        if let Some(index) = self.schedule.bucket(parse_created_at(raw)?) {
            self.counts[index] += 1;
        }
        Ok(())
    }

    /// Tweets per session, in schedule order.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total tweets that carried the hashtag, bucketed or not.
    pub fn tagged(&self) -> u64 {
        self.tagged
    }
}
