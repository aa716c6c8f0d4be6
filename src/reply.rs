//! Value grammars for read-command replies
//!
//! Query replies are loosely formatted text: `"87"`, `"10dm"`, `"83~85C"`,
//! `"pitch:0;roll:-2;yaw:45;"`. Each field gets its own small parser.

use crate::{Result, TelloError};
use regex::Regex;
use std::str::FromStr;

pub struct ReplyGrammar {
    numeric_noise: Regex,
}

impl ReplyGrammar {
    pub fn new() -> Result<Self> {
        let numeric_noise = Regex::new(r"[^\d.-]")
            .map_err(|e| TelloError::Parse(format!("invalid reply pattern: {}", e)))?;
        Ok(Self { numeric_noise })
    }

    /// Trimmed text parsed as-is
    pub fn plain<T: FromStr>(&self, reply: &str) -> Result<T> {
        let text = reply.trim();
        text.parse()
            .map_err(|_| TelloError::Parse(format!("unexpected reply '{}'", text)))
    }

    /// Keeps only digits, `.` and `-` before parsing, so unit suffixes like
    /// `s`, `dm` or `mm` fall away
    pub fn numeric<T: FromStr>(&self, reply: &str) -> Result<T> {
        let digits = self.numeric_noise.replace_all(reply.trim(), "");
        digits
            .parse()
            .map_err(|_| TelloError::Parse(format!("no number in reply '{}'", reply.trim())))
    }

    /// Temperature replies are a range such as `83~85C`; the low bound is used
    pub fn temperature(&self, reply: &str) -> Result<i32> {
        let low = reply.trim().split('~').next().unwrap_or_default();
        self.numeric(low)
    }

    /// Three `name:value` pairs separated by `;`
    pub fn axes<T: FromStr + Default + Copy>(&self, reply: &str) -> Result<[T; 3]> {
        let mut values = [T::default(); 3];
        let mut pairs = reply
            .trim()
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty());

        for value in values.iter_mut() {
            let pair = pairs
                .next()
                .ok_or_else(|| TelloError::Parse(format!("expected three axes in '{}'", reply.trim())))?;
            let (_, raw) = pair
                .split_once(':')
                .ok_or_else(|| TelloError::Parse(format!("malformed axis '{}'", pair)))?;
            *value = self.plain(raw)?;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_numeric() {
        let grammar = ReplyGrammar::new().unwrap();
        assert_eq!(grammar.plain::<u32>(" 87\r\n").unwrap(), 87);
        assert_eq!(grammar.plain::<f64>("-56.84").unwrap(), -56.84);
        assert_eq!(grammar.numeric::<i32>("12s").unwrap(), 12);
        assert_eq!(grammar.numeric::<i32>("10dm\r\n").unwrap(), 10);
        assert_eq!(grammar.numeric::<f64>("100mm").unwrap(), 100.0);
        assert!(grammar.plain::<u32>("full").is_err());
        assert!(grammar.numeric::<i32>("none").is_err());
    }

    #[test]
    fn test_temperature_range() {
        let grammar = ReplyGrammar::new().unwrap();
        assert_eq!(grammar.temperature("83~85C").unwrap(), 83);
        assert_eq!(grammar.temperature("60C").unwrap(), 60);
    }

    #[test]
    fn test_axes() {
        let grammar = ReplyGrammar::new().unwrap();
        let attitude: [i32; 3] = grammar.axes("pitch:0;roll:-2;yaw:45;\r\n").unwrap();
        assert_eq!(attitude, [0, -2, 45]);

        let acceleration: [f64; 3] = grammar.axes("agx:-1.00;agy:-12.00;agz:-998.00;").unwrap();
        assert_eq!(acceleration, [-1.0, -12.0, -998.0]);

        assert!(grammar.axes::<i32>("pitch:0;roll:1").is_err());
        assert!(grammar.axes::<i32>("pitch:0;roll;yaw:1").is_err());
    }
}
