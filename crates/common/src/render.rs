//! Turns a registry snapshot into bar content.

use crate::config::FormatConfig;
use crate::error::ConfigError;
use crate::format::{Composite, SegmentTag, Template};
use crate::types::{Action, Device};

/// Placeholder in the bar template that expands to the device list.
pub const DEVICE_LIST_PLACEHOLDER: &str = "format_device";

/// Formats each device, tags it with its id and joins the results with the
/// separator, tagged as non-actionable.
///
/// A device whose text comes out empty is shown as `#<id>` so it can still
/// be clicked.
pub fn build_device_list(
    devices: &[Device],
    device: &Template,
    separator: &Template,
) -> Composite {
    let separator =
        Composite::text(separator.render_text(|_| None)).with_tag(SegmentTag::Separator);
    let parts = devices
        .iter()
        .map(|d| {
            let mut text = device.render_text(|name| d.placeholder(name));
            if text.is_empty() {
                text = format!("#{}", d.id);
            }
            Composite::text(text).with_tag(SegmentTag::Device(d.id))
        })
        .collect();
    Composite::join(&separator, parts)
}

pub fn render_notification(template: &Template, device: &Device, action: Action) -> String {
    template.render_text(|name| match name {
        "action" => Some(action.to_string()),
        _ => device.placeholder(name),
    })
}

/// What the host should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarView {
    pub composite: Composite,
    pub urgent: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    bar: Template,
    device: Template,
    separator: Template,
    urgent_when_empty: bool,
}

impl Renderer {
    pub fn new(format: &FormatConfig, urgent_when_empty: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            bar: format.bar_template()?,
            device: format.device_template()?,
            separator: format.separator_template()?,
            urgent_when_empty,
        })
    }

    pub fn render(&self, devices: &[Device], error: Option<&str>) -> BarView {
        if let Some(error) = error {
            return BarView {
                composite: Composite::text(error),
                urgent: true,
                error: Some(error.to_string()),
            };
        }
        let list = build_device_list(devices, &self.device, &self.separator);
        let composite = self
            .bar
            .render(|name| (name == DEVICE_LIST_PLACEHOLDER).then(|| list.clone()));
        BarView {
            composite,
            urgent: self.urgent_when_empty || !devices.is_empty(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attribute;

    fn renderer() -> Renderer {
        Renderer::new(&FormatConfig::default(), true).unwrap()
    }

    #[test]
    fn device_segments_carry_ids() {
        let devices = vec![
            Device::new(42).with_attribute(Attribute::Name, "Mass Storage"),
            Device::new(7).with_attribute(Attribute::Name, "Keyboard"),
        ];
        let view = renderer().render(&devices, None);
        assert!(view.urgent);
        assert_eq!(view.composite.to_text(), "Mass Storage | Keyboard");
        let tags: Vec<_> = view.composite.segments().iter().map(|s| s.index).collect();
        assert_eq!(
            tags,
            vec![
                Some(SegmentTag::Device(42)),
                Some(SegmentTag::Separator),
                Some(SegmentTag::Device(7))
            ]
        );
    }

    #[test]
    fn empty_registry_renders_empty_and_urgent() {
        let view = renderer().render(&[], None);
        assert!(view.composite.is_empty());
        assert!(view.urgent);
        assert_eq!(view.error, None);
    }

    #[test]
    fn urgency_can_follow_registry() {
        let r = Renderer::new(&FormatConfig::default(), false).unwrap();
        assert!(!r.render(&[], None).urgent);
        assert!(r.render(&[Device::new(1)], None).urgent);
    }

    #[test]
    fn error_replaces_content() {
        let view = renderer().render(
            &[Device::new(1)],
            Some("usbguard-dbus service not running"),
        );
        assert!(view.urgent);
        assert_eq!(view.composite.to_text(), "usbguard-dbus service not running");
        assert!(view.error.is_some());
    }

    #[test]
    fn nameless_devices_stay_clickable() {
        let devices = vec![
            Device::new(1),
            Device::new(2).with_attribute(Attribute::Name, "Keyboard"),
            Device::new(3),
        ];
        let list = build_device_list(
            &devices,
            &Template::parse("{name}").unwrap(),
            &Template::parse(" | ").unwrap(),
        );
        assert_eq!(list.to_text(), "#1 | Keyboard | #3");
        let tags: Vec<_> = list.segments().iter().map(|s| s.index).collect();
        assert_eq!(
            tags,
            vec![
                Some(SegmentTag::Device(1)),
                Some(SegmentTag::Separator),
                Some(SegmentTag::Device(2)),
                Some(SegmentTag::Separator),
                Some(SegmentTag::Device(3))
            ]
        );

        let list = build_device_list(
            &[Device::new(3)],
            &Template::parse("#{usbguard_id} {name}").unwrap(),
            &Template::parse(" | ").unwrap(),
        );
        assert_eq!(list.to_text(), "#3 ");
    }

    #[test]
    fn notification_text() {
        let device = Device::new(42).with_attribute(Attribute::Name, "Mass Storage");
        let t = Template::parse("{name} is {action}").unwrap();
        assert_eq!(render_notification(&t, &device, Action::Allow), "Mass Storage is allow");
    }
}
