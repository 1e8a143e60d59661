//! Event taxonomy: the six contract events the pipeline reconciles.
//!
//! Dispatch matches `topics[0]` of a log against the keccak256 hash of each
//! canonical event declaration. The declarations below are a wire contract:
//! a single character off and no log will ever match.

use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

/// Audit-trail kind tag under which the backfill checkpoint is recorded.
pub const CHECKPOINT_KIND: &str = "event";

/// Compute keccak256 over `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// 4-byte function selector for a canonical signature like `"getEvent(uint256)"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// The known contract events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    EventCreated,
    ParticipantRegistered,
    ParticipantCheckedIn,
    SponsorAdded,
    TicketIssued,
    TicketUsed,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::EventCreated,
        EventKind::ParticipantRegistered,
        EventKind::ParticipantCheckedIn,
        EventKind::SponsorAdded,
        EventKind::TicketIssued,
        EventKind::TicketUsed,
    ];

    /// Canonical event declaration, hashed to produce `topics[0]`.
    pub fn signature(self) -> &'static str {
        match self {
            Self::EventCreated => "EventCreated(uint256,address,string)",
            Self::ParticipantRegistered => "ParticipantRegistered(uint256,address)",
            Self::ParticipantCheckedIn => "ParticipantCheckedIn(uint256,address)",
            Self::SponsorAdded => "SponsorAdded(uint256,address,uint256)",
            Self::TicketIssued => "TicketIssued(uint256,address,uint256)",
            Self::TicketUsed => "TicketUsed(uint256)",
        }
    }

    /// Audit-trail kind tag (`"sponsor_added"`, ...).
    pub fn tag(self) -> &'static str {
        match self {
            Self::EventCreated => "event_created",
            Self::ParticipantRegistered => "participant_registered",
            Self::ParticipantCheckedIn => "participant_checked_in",
            Self::SponsorAdded => "sponsor_added",
            Self::TicketIssued => "ticket_issued",
            Self::TicketUsed => "ticket_used",
        }
    }

    /// Minimum number of topics (including `topics[0]`) a log of this kind
    /// must carry for its indexed keys to be extracted.
    pub fn min_topics(self) -> usize {
        match self {
            Self::EventCreated | Self::TicketIssued | Self::TicketUsed => 2,
            Self::ParticipantRegistered | Self::ParticipantCheckedIn | Self::SponsorAdded => 3,
        }
    }

    /// `0x`-prefixed keccak256 of [`signature`](Self::signature).
    pub fn topic(self) -> String {
        format!("0x{}", hex::encode(keccak256(self.signature().as_bytes())))
    }

    /// Returns `true` if `topic0` is this kind's signature hash (case-insensitive).
    pub fn matches(self, topic0: &str) -> bool {
        self.topic().eq_ignore_ascii_case(topic0)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Classification of a log by its first topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogKind {
    Known(EventKind),
    /// Unrecognised signature; carries the raw `topics[0]` (empty if absent).
    Unknown(String),
}

impl LogKind {
    pub fn classify(topic0: Option<&str>) -> Self {
        let Some(topic0) = topic0 else {
            return Self::Unknown(String::new());
        };
        EventKind::ALL
            .into_iter()
            .find(|k| k.matches(topic0))
            .map(Self::Known)
            .unwrap_or_else(|| Self::Unknown(topic0.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_matches_known_transfer_topic() {
        let hash = keccak256(b"Transfer(address,address,uint256)");
        assert_eq!(
            hex::encode(hash),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn sponsor_added_topic() {
        assert_eq!(
            EventKind::SponsorAdded.topic(),
            "0xd23aaa3ee60ce3f938e54e5b192945b974b53dd4a48edcf51ba4ce92de65021c"
        );
    }

    #[test]
    fn ticket_used_topic() {
        assert_eq!(
            EventKind::TicketUsed.topic(),
            "0x1f5d53e38fbc5a40092861e993062e74fb6dc7acef58356c7b55aa1afd8b3501"
        );
    }

    #[test]
    fn selectors() {
        assert_eq!(selector("getEvent(uint256)"), [0x6d, 0x18, 0x84, 0xe0]);
        assert_eq!(selector("getTicket(uint256)"), [0x7d, 0xc3, 0x79, 0xfa]);
    }

    #[test]
    fn classify_every_kind() {
        for kind in EventKind::ALL {
            assert_eq!(LogKind::classify(Some(&kind.topic())), LogKind::Known(kind));
        }
    }

    #[test]
    fn classify_is_case_insensitive() {
        let upper = EventKind::EventCreated.topic().to_uppercase().replacen("0X", "0x", 1);
        assert_eq!(LogKind::classify(Some(&upper)), LogKind::Known(EventKind::EventCreated));
    }

    #[test]
    fn classify_unknown_keeps_raw_topic() {
        let raw = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
        assert_eq!(LogKind::classify(Some(raw)), LogKind::Unknown(raw.to_string()));
        assert_eq!(LogKind::classify(None), LogKind::Unknown(String::new()));
    }

    #[test]
    fn tags_are_distinct() {
        let mut tags: Vec<_> = EventKind::ALL.iter().map(|k| k.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), 6);
        assert!(!tags.contains(&CHECKPOINT_KIND));
    }
}
