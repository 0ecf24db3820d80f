//! Parser for usbguard device rules as returned by `listDevices`.
//!
//! A rule looks like
//! `block id 046d:c534 serial "ABC" name "USB Receiver" via-port "2-1" with-interface { 03:01:01 03:01:02 }`.
//! Only the target and the attributes in [`Attribute`] are extracted.

use crate::types::{Action, Attribute, Device, DeviceAttributes, DeviceId, Interest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub target: Action,
    pub attributes: DeviceAttributes,
}

impl ParsedRule {
    pub fn into_device(mut self, id: DeviceId, interest: &Interest) -> Device {
        self.attributes.retain(interest);
        Device {
            id,
            attributes: self.attributes,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Word(String),
    Open,
    Close,
}

fn tokenize(rule: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = rule.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '{' => tokens.push(Token::Open),
            '}' => tokens.push(Token::Close),
            '"' => {
                let mut word = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                word.push(escaped);
                            }
                        }
                        '"' => break,
                        c => word.push(c),
                    }
                }
                tokens.push(Token::Word(word));
            }
            c => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '{' || next == '}' || next == '"' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    tokens
}

/// Parses a device rule. Returns `None` when the rule does not start with a
/// known target.
pub fn parse_rule(rule: &str) -> Option<ParsedRule> {
    let rule = rule.trim();
    // `usbguard list-devices` prefixes rules with `<n>: `
    let rule = match rule.split_once(": ") {
        Some((n, rest)) if n.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => rule,
    };

    let mut tokens = tokenize(rule).into_iter();
    let target = match tokens.next()? {
        Token::Word(w) => w.parse::<Action>().ok()?,
        _ => return None,
    };

    let mut attributes = DeviceAttributes::default();
    while let Some(token) = tokens.next() {
        let Token::Word(key) = token else {
            continue;
        };
        let value = match tokens.next() {
            Some(Token::Word(v)) => v,
            Some(Token::Open) => {
                let mut items = Vec::new();
                for t in tokens.by_ref() {
                    match t {
                        Token::Word(w) => items.push(w),
                        _ => break,
                    }
                }
                items.join(" ")
            }
            Some(Token::Close) | None => break,
        };
        if let Some(attr) = Attribute::from_bus_key(&key) {
            attributes.set(attr, Some(value));
        }
    }

    Some(ParsedRule { target, attributes })
}
