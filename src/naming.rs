//! Wire channel naming.
//!
//! Every channel an engine sends on or listens to goes through one
//! [`ChannelNamer`], so a single prefix isolates all of that engine's traffic
//! from other engines sharing the transport.

const CHECK_LISTENER: &str = "check-listener";
const CHECK_REPLY: &str = "check-reply:";
const CANCEL_SUFFIX: &str = ":cancel";

/// Derives wire channel names from logical names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelNamer {
    prefix: String,
}

impl ChannelNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `prefix + logical`
    pub fn wire(&self, logical: &str) -> String {
        format!("{}{logical}", self.prefix)
    }

    /// Channel carrying invocation messages for `operation`.
    pub fn operation(&self, operation: &str) -> String {
        self.wire(operation)
    }

    /// Channel the liveness responder listens on.
    pub fn check_listener(&self) -> String {
        self.wire(CHECK_LISTENER)
    }

    /// One-shot reply channel for a liveness query about `operation`.
    pub fn check_reply(&self, operation: &str) -> String {
        format!("{}{CHECK_REPLY}{operation}", self.prefix)
    }

    /// Result stream channel of the `n`th invocation issued by an engine.
    pub fn sub_channel(&self, operation: &str, n: u64) -> String {
        format!("{}{operation}:{n}", self.prefix)
    }

    /// Upstream cancellation channel paired with an already-prefixed
    /// sub-channel.
    pub fn cancel_channel(sub_channel: &str) -> String {
        format!("{sub_channel}{CANCEL_SUFFIX}")
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn empty_prefix_is_identity() {
        // ---
        let namer = ChannelNamer::default();
        assert_eq!(namer.wire("test-main"), "test-main");
        assert_eq!(namer.check_listener(), "check-listener");
        assert_eq!(namer.check_reply("test-main"), "check-reply:test-main");
        assert_eq!(namer.sub_channel("test-main", 0), "test-main:0");
    }

    #[test]
    fn prefix_applies_to_every_channel() {
        // ---
        let namer = ChannelNamer::new("$foo/");
        assert_eq!(namer.prefix(), "$foo/");
        assert_eq!(namer.operation("op"), "$foo/op");
        assert_eq!(namer.check_listener(), "$foo/check-listener");
        assert_eq!(namer.check_reply("op"), "$foo/check-reply:op");
        assert_eq!(namer.sub_channel("op", 7), "$foo/op:7");
        assert_eq!(
            ChannelNamer::cancel_channel(&namer.sub_channel("op", 7)),
            "$foo/op:7:cancel"
        );
    }
}
