use serde_json::Value;

use crate::{Result, RpcError};

/// Invocation message sent on an operation channel.
///
/// Wire form: `[subChannel, ...args]`. The sub-channel is the (prefixed)
/// channel the producer must answer on.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationMessage {
    pub sub_channel: String,
    pub args: Vec<Value>,
}

impl InvocationMessage {
    pub fn new(sub_channel: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sub_channel: sub_channel.into(),
            args,
        }
    }

    pub fn into_args(self) -> Vec<Value> {
        // ---
        let mut wire = Vec::with_capacity(self.args.len() + 1);
        wire.push(Value::String(self.sub_channel));
        wire.extend(self.args);
        wire
    }

    pub fn from_args(args: Vec<Value>) -> Result<Self> {
        // ---
        let mut args = args.into_iter();
        match args.next() {
            Some(Value::String(sub_channel)) => Ok(Self {
                sub_channel,
                args: args.collect(),
            }),
            Some(other) => Err(RpcError::Protocol(format!(
                "invocation sub-channel must be a string, got {other}"
            ))),
            None => Err(RpcError::Protocol("invocation without sub-channel".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn sub_channel_leads_the_argument_list() {
        // ---
        let msg = InvocationMessage::new("test-main:0", vec![json!(1), json!(2)]);
        assert_eq!(
            msg.clone().into_args(),
            vec![json!("test-main:0"), json!(1), json!(2)]
        );
        assert_eq!(
            InvocationMessage::from_args(vec![json!("test-main:0"), json!(1), json!(2)]).unwrap(),
            msg
        );
    }

    #[test]
    fn no_arguments_is_valid() {
        // ---
        let msg = InvocationMessage::from_args(vec![json!("op:3")]).unwrap();
        assert_eq!(msg.sub_channel, "op:3");
        assert!(msg.args.is_empty());
    }

    #[test]
    fn rejects_missing_or_non_string_sub_channel() {
        // ---
        assert!(InvocationMessage::from_args(vec![]).is_err());
        assert!(InvocationMessage::from_args(vec![json!(42)]).is_err());
    }
}
