//! i3bar JSON protocol: blocks on stdout, click events on stdin.

use serde::{Deserialize, Serialize};

use guardbar_common::format::SegmentTag;
use guardbar_common::render::BarView;
use guardbar_common::types::{ClickEvent, ClickIndex};

pub const BLOCK_NAME: &str = "usbguard";
const SEPARATOR_INSTANCE: &str = "sep";

#[derive(Debug, Serialize)]
pub struct Header {
    pub version: u32,
    pub click_events: bool,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: 1,
            click_events: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub full_text: String,
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub urgent: bool,
    pub separator: bool,
    pub separator_block_width: u32,
}

/// One block per segment so each device can be clicked separately. An urgent
/// view with nothing to show still yields one empty block carrying the flag.
pub fn blocks(view: &BarView) -> Vec<Block> {
    let mut blocks: Vec<Block> = view
        .composite
        .segments()
        .iter()
        .filter(|s| !s.full_text.is_empty())
        .map(|s| Block {
            full_text: s.full_text.clone(),
            name: BLOCK_NAME,
            instance: s.index.map(|tag| match tag {
                SegmentTag::Device(id) => id.to_string(),
                SegmentTag::Separator => SEPARATOR_INSTANCE.to_string(),
            }),
            urgent: view.urgent,
            separator: false,
            separator_block_width: 0,
        })
        .collect();
    if blocks.is_empty() && view.urgent {
        blocks.push(Block {
            full_text: String::new(),
            name: BLOCK_NAME,
            instance: None,
            urgent: true,
            separator: false,
            separator_block_width: 0,
        });
    }
    blocks
}

/// Serializes one status line of the infinite array.
pub fn status_line(view: &BarView, first: bool) -> serde_json::Result<String> {
    let json = serde_json::to_string(&blocks(view))?;
    Ok(if first { json } else { format!(",{json}") })
}

#[derive(Debug, Deserialize)]
struct RawClick {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    instance: Option<String>,
    button: u8,
}

/// Parses one stdin line. Returns `Ok(None)` for the array framing and for
/// clicks on other blocks.
pub fn parse_click(line: &str) -> serde_json::Result<Option<ClickEvent>> {
    let line = line.trim().trim_start_matches(',').trim();
    if line.is_empty() || line == "[" || line == "]" {
        return Ok(None);
    }
    let raw: RawClick = serde_json::from_str(line)?;
    if raw.name.as_deref().is_some_and(|n| n != BLOCK_NAME) {
        return Ok(None);
    }
    let index = raw.instance.as_deref().and_then(|instance| match instance {
        SEPARATOR_INSTANCE => Some(ClickIndex::Separator),
        other => other.parse().ok().map(ClickIndex::Device),
    });
    Ok(Some(ClickEvent {
        button: raw.button,
        index,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardbar_common::format::Composite;

    #[test]
    fn device_and_separator_blocks() {
        let composite = Composite::join(
            &Composite::tagged(" | ", SegmentTag::Separator),
            vec![
                Composite::tagged("Mass Storage", SegmentTag::Device(42)),
                Composite::tagged("Keyboard", SegmentTag::Device(7)),
            ],
        );
        let view = BarView {
            composite,
            urgent: true,
            error: None,
        };
        let blocks = blocks(&view);
        let instances: Vec<_> = blocks.iter().map(|b| b.instance.as_deref()).collect();
        assert_eq!(instances, vec![Some("42"), Some("sep"), Some("7")]);
        assert!(blocks.iter().all(|b| b.urgent && b.name == BLOCK_NAME));

        let line = status_line(&view, false).unwrap();
        assert!(line.starts_with(",["));
        assert!(line.contains(r#""full_text":"Mass Storage""#));
    }

    #[test]
    fn empty_urgent_view_keeps_flag() {
        let mut view = BarView {
            composite: Composite::new(),
            urgent: true,
            error: None,
        };
        let blocks = blocks(&view);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].urgent);
        assert_eq!(blocks[0].full_text, "");
        assert_eq!(blocks[0].instance, None);

        view.urgent = false;
        assert_eq!(status_line(&view, true).unwrap(), "[]");
    }

    #[test]
    fn parses_clicks() {
        assert_eq!(parse_click("[").unwrap(), None);
        assert_eq!(
            parse_click(r#"{"name":"usbguard","instance":"42","button":1,"x":10}"#).unwrap(),
            Some(ClickEvent {
                button: 1,
                index: Some(ClickIndex::Device(42))
            })
        );
        assert_eq!(
            parse_click(r#",{"name":"usbguard","instance":"sep","button":3}"#).unwrap(),
            Some(ClickEvent {
                button: 3,
                index: Some(ClickIndex::Separator)
            })
        );
        assert_eq!(
            parse_click(r#"{"name":"usbguard","button":1}"#).unwrap(),
            Some(ClickEvent {
                button: 1,
                index: None
            })
        );
        assert_eq!(parse_click(r#"{"name":"clock","button":1}"#).unwrap(), None);
        assert!(parse_click("{not json").is_err());
    }
}
