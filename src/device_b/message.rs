//! Device-B ASCII message encoding/parsing.

use crate::error::FrameError;

pub const HOST_ROLE: &str = "ZUzu";

/// The compile-time set of recognized message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Comm check / heartbeat.
    Chek,
    /// Enable periodic reporting for a stream.
    Prpt,
    /// Set a periodic stream's report interval.
    Trpt,
    /// Request a single report for a stream.
    Srpt,
    /// Periodic readings stream.
    Rdng,
    /// Drive-levels stream.
    Drvl,
    /// Real-time clock get/set.
    Time,
    /// FID readings stream.
    Fidr,
    /// Error response to an in-flight request.
    Eror,
    /// A spontaneous (unsolicited) error.
    Serr,
    /// Firmware version.
    Vers,
    /// Device-initiated shutdown notice.
    Shut,
    /// Start/stop the auto-ignition sequence.
    Aigs,
    /// Battery status stream.
    Bats,
    /// Warmup time (fetched to enrich a code-21 error message).
    Wutm,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chek => "CHEK",
            Self::Prpt => "PRPT",
            Self::Trpt => "TRPT",
            Self::Srpt => "SRPT",
            Self::Rdng => "RDNG",
            Self::Drvl => "DRVL",
            Self::Time => "TIME",
            Self::Fidr => "FIDR",
            Self::Eror => "EROR",
            Self::Serr => "SERR",
            Self::Vers => "VERS",
            Self::Shut => "SHUT",
            Self::Aigs => "AIGS",
            Self::Bats => "BATS",
            Self::Wutm => "WUTM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CHEK" => Some(Self::Chek),
            "PRPT" => Some(Self::Prpt),
            "TRPT" => Some(Self::Trpt),
            "SRPT" => Some(Self::Srpt),
            "RDNG" => Some(Self::Rdng),
            "DRVL" => Some(Self::Drvl),
            "TIME" => Some(Self::Time),
            "FIDR" => Some(Self::Fidr),
            "EROR" => Some(Self::Eror),
            "SERR" => Some(Self::Serr),
            "VERS" => Some(Self::Vers),
            "SHUT" => Some(Self::Shut),
            "AIGS" => Some(Self::Aigs),
            "BATS" => Some(Self::Bats),
            "WUTM" => Some(Self::Wutm),
            _ => None,
        }
    }

    /// The periodic readings streams, in selectivity order (most selective
    /// first): `FIDR > RDNG > DRVL > BATS`.
    pub const READINGS_STREAMS: [MessageType; 4] =
        [MessageType::Fidr, MessageType::Rdng, MessageType::Drvl, MessageType::Bats];
}

/// A decoded Device-B line, host role already stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub msg_type: MessageType,
    pub params: Vec<(String, String)>,
    pub unparsed: Option<String>,
}

impl Message {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Encodes `"ZUzu <TYPE> <k1=v1,k2=v2,...> <unparsed>\r\n"`, trimming
/// trailing spaces when params and unparsed are both empty.
pub fn encode(msg_type: MessageType, params: &[(&str, &str)], unparsed: &str) -> Vec<u8> {
    let mut line = format!("{} {}", HOST_ROLE, msg_type.as_str());
    if !params.is_empty() {
        let params_str = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        line.push(' ');
        line.push_str(&params_str);
    }
    if !unparsed.is_empty() {
        line.push(' ');
        line.push_str(unparsed);
    }
    line.push_str("\r\n");
    line.into_bytes()
}

/// Parses a single line (CR-LF already stripped). Token[0] (the role) must be
/// at most 5 bytes; token[1] must be a recognized type; the remainder is
/// `Parameters` if it contains `=`, else `UnparsedString`.
pub fn parse(line: &str) -> Result<Message, FrameError> {
    let mut tokens = line.splitn(3, ' ');
    let role = tokens.next().unwrap_or("");
    if role.len() > 5 {
        return Err(FrameError::UnknownType(line.to_string()));
    }
    let type_token = tokens
        .next()
        .ok_or_else(|| FrameError::UnknownType(line.to_string()))?;
    let msg_type = MessageType::parse(type_token)
        .ok_or_else(|| FrameError::UnknownType(type_token.to_string()))?;
    let rest = tokens.next().unwrap_or("");

    let (params, unparsed) = if rest.contains('=') {
        let mut params = Vec::new();
        for pair in rest.split(',') {
            let mut kv = pair.splitn(2, '=');
            let key = kv.next().unwrap_or("").trim();
            let value = kv.next().unwrap_or("").trim();
            if key.is_empty() {
                return Err(FrameError::BadParameters(rest.to_string()));
            }
            params.push((key.to_string(), value.to_string()));
        }
        (params, None)
    } else if rest.is_empty() {
        (Vec::new(), None)
    } else {
        (Vec::new(), Some(rest.to_string()))
    };

    Ok(Message { msg_type, params, unparsed })
}

/// What one completed line yielded.
pub enum LineOutcome {
    Message(Message),
    /// A line that did not parse; surfaced to an optional raw-message
    /// observer before the deframer resyncs.
    Discarded(String),
}

/// Number of consecutive unparseable lines tolerated before giving up
///.
const MAX_RESYNC_ATTEMPTS: u32 = 5;

/// Accumulates bytes until a CR-LF terminator, then parses the line.
pub struct LineDeframer {
    buf: Vec<u8>,
    resync_attempts: u32,
}

impl LineDeframer {
    pub fn new() -> Self {
        Self { buf: Vec::new(), resync_attempts: 0 }
    }

    pub fn push_byte(&mut self, byte: u8) -> Result<Option<LineOutcome>, FrameError> {
        self.buf.push(byte);
        if !self.buf.ends_with(b"\r\n") {
            return Ok(None);
        }
        let line_bytes = self.buf[..self.buf.len() - 2].to_vec();
        self.buf.clear();
        let line = String::from_utf8_lossy(&line_bytes).into_owned();

        match parse(&line) {
            Ok(msg) => {
                self.resync_attempts = 0;
                Ok(Some(LineOutcome::Message(msg)))
            }
            Err(_) => {
                self.resync_attempts += 1;
                if self.resync_attempts > MAX_RESYNC_ATTEMPTS {
                    return Err(FrameError::ResyncBudgetExhausted(MAX_RESYNC_ATTEMPTS));
                }
                Ok(Some(LineOutcome::Discarded(line)))
            }
        }
    }
}

impl Default for LineDeframer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_round_trips() {
        let encoded = encode(MessageType::Time, &[("TS", "2020/01/02_03:04:05")], "");
        let line = std::str::from_utf8(&encoded).unwrap();
        assert_eq!(line, "ZUzu TIME TS=2020/01/02_03:04:05\r\n");
        let stripped = &line[..line.len() - 2];
        let msg = parse(stripped).unwrap();
        assert_eq!(msg.msg_type, MessageType::Time);
        assert_eq!(msg.param("TS"), Some("2020/01/02_03:04:05"));
    }

    #[test]
    fn encode_trims_when_params_and_unparsed_are_empty() {
        let encoded = encode(MessageType::Chek, &[], "");
        assert_eq!(encoded, b"ZUzu CHEK\r\n");
    }

    #[test]
    fn parse_rejects_unknown_type() {
        assert!(matches!(parse("ZUzu NOPE"), Err(FrameError::UnknownType(_))));
    }

    #[test]
    fn deframer_resyncs_on_garbage_then_parses() {
        let mut deframer = LineDeframer::new();
        let mut outcomes = Vec::new();
        for byte in b"ZUzu NOPE\r\nZUzu CHEK\r\n" {
            if let Some(outcome) = deframer.push_byte(*byte).unwrap() {
                outcomes.push(outcome);
            }
        }
        assert!(matches!(outcomes[0], LineOutcome::Discarded(_)));
        assert!(matches!(outcomes[1], LineOutcome::Message(ref m) if m.msg_type == MessageType::Chek));
    }

    #[test]
    fn deframer_fails_after_exhausting_resync_budget() {
        let mut deframer = LineDeframer::new();
        let mut last_err = None;
        for _ in 0..6 {
            last_err = None;
            for byte in b"ZUzu NOPE\r\n" {
                match deframer.push_byte(*byte) {
                    Ok(_) => {}
                    Err(e) => last_err = Some(e),
                }
            }
        }
        assert!(matches!(last_err, Some(FrameError::ResyncBudgetExhausted(5))));
    }
}
