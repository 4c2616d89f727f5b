//! WebSocket close codes used by the session layer.

use std::fmt;

/// Close code sent when a session is rejected because its resource is suspended.
pub const SUSPENDED_CLOSE_CODE: u16 = 4409;

/// Close reason paired with [`SUSPENDED_CLOSE_CODE`].
pub const SUSPENDED_CLOSE_REASON: &str = "server is suspended";

/// A WebSocket close status code.
///
/// Only the codes the session layer distinguishes get named variants;
/// everything else is carried verbatim in [`CloseCode::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000
    Normal,
    /// 1001
    GoingAway,
    /// 1005, reported locally when a close frame carried no status.
    NoStatusReceived,
    /// 1006, reported locally when the peer vanished without a close frame.
    Abnormal,
    /// 1012
    ServiceRestart,
    /// Any other code, including application codes in the 4000 range.
    Other(u16),
}

impl CloseCode {
    /// Codes that mark an ordinary end of a session.
    ///
    /// A read that fails with any other code is logged as an unexpected closure.
    pub const EXPECTED: [CloseCode; 5] = [
        CloseCode::GoingAway,
        CloseCode::Abnormal,
        CloseCode::Normal,
        CloseCode::NoStatusReceived,
        CloseCode::ServiceRestart,
    ];

    /// Whether this code is in [`CloseCode::EXPECTED`].
    pub fn is_expected(self) -> bool {
        Self::EXPECTED.contains(&self)
    }

    /// Numeric value on the wire.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::NoStatusReceived => 1005,
            Self::Abnormal => 1006,
            Self::ServiceRestart => 1012,
            Self::Other(code) => code,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1005 => Self::NoStatusReceived,
            1006 => Self::Abnormal,
            1012 => Self::ServiceRestart,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_codes() {
        for code in [1000, 1001, 1005, 1006, 1012] {
            assert!(CloseCode::from(code).is_expected(), "{code} should be expected");
        }
    }

    #[test]
    fn unexpected_codes() {
        for code in [1002, 1003, 1008, 1009, 1011, 4000, SUSPENDED_CLOSE_CODE] {
            assert!(!CloseCode::from(code).is_expected(), "{code} should be unexpected");
        }
    }

    #[test]
    fn named_codes_map_back_to_numbers() {
        assert_eq!(CloseCode::from(1001), CloseCode::GoingAway);
        assert_eq!(CloseCode::GoingAway.as_u16(), 1001);
        assert_eq!(CloseCode::from(4409), CloseCode::Other(4409));
        assert_eq!(CloseCode::Other(4409).to_string(), "4409");
    }
}
