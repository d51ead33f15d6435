use std::fmt;
use std::str::{FromStr, Split};

use super::{MessageError, NodeId};

const KIND_REQUEST_VOTE: &str = "REQUEST_VOTE";
const KIND_VOTE: &str = "VOTE";
const KIND_HEARTBEAT: &str = "HEARTBEAT";

/// Election protocol messages. Every message carries the sender's term.
///
/// On the wire each message is a single pipe-delimited line, e.g.
/// `REQUEST_VOTE|3|1`, `VOTE|3|2|True`, `HEARTBEAT|3|1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    RequestVote { term: u64, candidate_id: NodeId },
    Vote { term: u64, voter_id: NodeId, granted: bool },
    Heartbeat { term: u64, leader_id: NodeId },
}

impl Message {
    /// Id of the node that produced the message.
    pub fn sender(&self) -> NodeId {
        match self {
            Message::RequestVote { candidate_id, .. } => *candidate_id,
            Message::Vote { voter_id, .. } => *voter_id,
            Message::Heartbeat { leader_id, .. } => *leader_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        std::str::from_utf8(bytes)
            .map_err(|_| MessageError::InvalidUtf8)?
            .parse()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::RequestVote { term, candidate_id } => {
                write!(f, "{KIND_REQUEST_VOTE}|{term}|{candidate_id}")
            }
            Message::Vote {
                term,
                voter_id,
                granted,
            } => {
                let granted = if *granted { "True" } else { "False" };
                write!(f, "{KIND_VOTE}|{term}|{voter_id}|{granted}")
            }
            Message::Heartbeat { term, leader_id } => {
                write!(f, "{KIND_HEARTBEAT}|{term}|{leader_id}")
            }
        }
    }
}

impl FromStr for Message {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches(['\r', '\n']);
        if s.is_empty() {
            return Err(MessageError::Empty);
        }

        let mut fields = Fields(s.split('|'));
        let kind = fields.next("kind")?;
        let message = match kind {
            KIND_REQUEST_VOTE => Message::RequestVote {
                term: fields.integer("term")?,
                candidate_id: fields.integer("candidate_id")?,
            },
            KIND_VOTE => Message::Vote {
                term: fields.integer("term")?,
                voter_id: fields.integer("voter_id")?,
                granted: match fields.next("granted")? {
                    "True" => true,
                    "False" => false,
                    other => return Err(MessageError::InvalidBool(other.to_string())),
                },
            },
            KIND_HEARTBEAT => Message::Heartbeat {
                term: fields.integer("term")?,
                leader_id: fields.integer("leader_id")?,
            },
            other => return Err(MessageError::UnknownKind(other.to_string())),
        };
        fields.finish()?;
        Ok(message)
    }
}

struct Fields<'a>(Split<'a, char>);

impl<'a> Fields<'a> {
    fn next(&mut self, field: &'static str) -> Result<&'a str, MessageError> {
        self.0.next().ok_or(MessageError::MissingField(field))
    }

    fn integer(&mut self, field: &'static str) -> Result<u64, MessageError> {
        let value = self.next(field)?;
        value.parse().map_err(|_| MessageError::InvalidInteger {
            field,
            value: value.to_string(),
        })
    }

    fn finish(mut self) -> Result<(), MessageError> {
        match self.0.next() {
            Some(extra) => Err(MessageError::TrailingField(extra.to_string())),
            None => Ok(()),
        }
    }
}

/// A message addressed to a single cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub to: NodeId,
    pub message: Message,
}

impl Envelope {
    pub fn new(to: NodeId, message: Message) -> Self {
        Self { to, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reference_wire_format() {
        let rv = Message::RequestVote {
            term: 1,
            candidate_id: 1,
        };
        assert_eq!(rv.to_string(), "REQUEST_VOTE|1|1");

        let vote = Message::Vote {
            term: 4,
            voter_id: 2,
            granted: true,
        };
        assert_eq!(vote.to_string(), "VOTE|4|2|True");

        let denied = Message::Vote {
            term: 4,
            voter_id: 0,
            granted: false,
        };
        assert_eq!(denied.to_string(), "VOTE|4|0|False");

        let hb = Message::Heartbeat {
            term: 9,
            leader_id: 3,
        };
        assert_eq!(hb.encode(), b"HEARTBEAT|9|3".to_vec());
    }

    #[test]
    fn decodes_each_kind() {
        assert_eq!(
            "REQUEST_VOTE|12|5".parse::<Message>(),
            Ok(Message::RequestVote {
                term: 12,
                candidate_id: 5
            })
        );
        assert_eq!(
            Message::decode(b"VOTE|2|0|False"),
            Ok(Message::Vote {
                term: 2,
                voter_id: 0,
                granted: false
            })
        );
        assert_eq!(
            "HEARTBEAT|3|1\n".parse::<Message>(),
            Ok(Message::Heartbeat {
                term: 3,
                leader_id: 1
            })
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!("".parse::<Message>(), Err(MessageError::Empty));
        assert!(matches!(
            "APPEND|1|2".parse::<Message>(),
            Err(MessageError::UnknownKind(k)) if k == "APPEND"
        ));
        assert_eq!(
            "HEARTBEAT|1".parse::<Message>(),
            Err(MessageError::MissingField("leader_id"))
        );
        assert!(matches!(
            "REQUEST_VOTE|-1|2".parse::<Message>(),
            Err(MessageError::InvalidInteger { field: "term", .. })
        ));
        assert_eq!(
            "VOTE|1|2|true".parse::<Message>(),
            Err(MessageError::InvalidBool("true".to_string()))
        );
        assert_eq!(
            "HEARTBEAT|1|2|3".parse::<Message>(),
            Err(MessageError::TrailingField("3".to_string()))
        );
        assert_eq!(
            Message::decode(&[0xff, 0xfe]),
            Err(MessageError::InvalidUtf8)
        );
    }

    #[test]
    fn sender_is_the_originating_node() {
        let vote = Message::Vote {
            term: 6,
            voter_id: 4,
            granted: true,
        };
        assert_eq!(vote.sender(), 4);
        let heartbeat = Message::Heartbeat {
            term: 6,
            leader_id: 2,
        };
        assert_eq!(heartbeat.sender(), 2);
    }
}
