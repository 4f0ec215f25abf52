use serde_json::Value;

use crate::{Result, RpcError};

const ITEM: &str = "item";
const ERROR: &str = "error";
const END: &str = "end";
const CANCEL: &str = "cancel";

/// Unit carried on a sub-channel.
///
/// On the wire an envelope is the argument list `[kind, payload?]`:
///
/// | variant  | args                  | direction          |
/// |----------|-----------------------|--------------------|
/// | `Item`   | `["item", payload]`   | producer → invoker |
/// | `Error`  | `["error", payload]`  | producer → invoker |
/// | `End`    | `["end"]`             | producer → invoker |
/// | `Cancel` | `["cancel"]`          | invoker → producer |
///
/// `Error` and `End` are terminal: nothing follows them on the same
/// sub-channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    Item(Value),
    Error(Value),
    End,
    Cancel,
}

impl Envelope {
    /// Wire discriminant.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Item(_) => ITEM,
            Envelope::Error(_) => ERROR,
            Envelope::End => END,
            Envelope::Cancel => CANCEL,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Envelope::Error(_) | Envelope::End)
    }

    pub fn into_args(self) -> Vec<Value> {
        // ---
        let kind = Value::from(self.kind());
        match self {
            Envelope::Item(payload) | Envelope::Error(payload) => vec![kind, payload],
            Envelope::End | Envelope::Cancel => vec![kind],
        }
    }

    /// Decode an envelope from a message's argument list.
    ///
    /// A missing payload on `item`/`error` decodes as `null`, matching what
    /// a sender that passed an undefined payload would produce. Extra
    /// trailing arguments are ignored.
    pub fn from_args(args: Vec<Value>) -> Result<Self> {
        // ---
        let mut args = args.into_iter();

        let kind = match args.next() {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(RpcError::Protocol(format!(
                    "envelope kind must be a string, got {other}"
                )))
            }
            None => return Err(RpcError::Protocol("empty envelope".into())),
        };
        let payload = args.next().unwrap_or(Value::Null);

        match kind.as_str() {
            ITEM => Ok(Envelope::Item(payload)),
            ERROR => Ok(Envelope::Error(payload)),
            END => Ok(Envelope::End),
            CANCEL => Ok(Envelope::Cancel),
            other => Err(RpcError::Protocol(format!("unknown envelope kind `{other}`"))),
        }
    }
}
