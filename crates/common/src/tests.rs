#[cfg(test)]
use crate::registry::Registry;
#[cfg(test)]
use crate::render::Renderer;
#[cfg(test)]
use crate::signal::{decode, DeviceEvent, RawSignal, SignalChannel};
#[cfg(test)]
use crate::config::FormatConfig;
#[cfg(test)]
use crate::types::{Action, Interest};
#[cfg(test)]
use std::collections::HashMap;

#[cfg(test)]
fn signal(
    channel: SignalChannel,
    id: u32,
    state: u32,
    rule: &str,
    name: Option<&str>,
) -> RawSignal {
    let mut attributes = HashMap::new();
    if let Some(name) = name {
        attributes.insert("name".to_string(), name.to_string());
    }
    RawSignal {
        channel,
        id,
        state,
        old_state: 0,
        rule: rule.into(),
        attributes,
    }
}

#[test]
fn mass_storage_lifecycle() {
    let interest = Interest::from_placeholders(["name"]);
    let registry = Registry::new();
    let renderer = Renderer::new(&FormatConfig::default(), true).expect("renderer");

    let inserted = signal(SignalChannel::Presence, 42, 1, "block id", Some("Mass Storage"));
    registry.apply(decode(&inserted, &interest).expect("insert event"));
    let device = registry.get(42).expect("pending");
    assert_eq!(device.attributes.name.as_deref(), Some("Mass Storage"));

    let view = renderer.render(&registry.snapshot_ordered(), None);
    assert!(view.composite.to_text().contains("Mass Storage"));
    assert!(view.urgent);

    let allowed = signal(SignalChannel::Policy, 42, 0, "allow id", None);
    registry.apply(decode(&allowed, &interest).expect("policy event"));
    assert!(!registry.contains(42));
    let view = renderer.render(&registry.snapshot_ordered(), None);
    assert!(!view.composite.to_text().contains("Mass Storage"));
    assert!(view.urgent);
}

#[test]
fn double_insert_keeps_second_attributes() {
    let interest = Interest::all();
    let registry = Registry::new();
    for name in ["first", "second"] {
        let s = signal(SignalChannel::Presence, 5, 1, "block id", Some(name));
        registry.apply(decode(&s, &interest).expect("event"));
    }
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get(5).and_then(|d| d.attributes.name),
        Some("second".to_string())
    );
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::rule::parse_rule;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Insert(u32),
        Remove(u32),
        Grant(u32, Action),
        Deny(u32),
    }

    fn step() -> impl Strategy<Value = Step> {
        let id = 0u32..6;
        prop_oneof![
            id.clone().prop_map(Step::Insert),
            id.clone().prop_map(Step::Remove),
            (id.clone(), prop_oneof![Just(Action::Allow), Just(Action::Reject)])
                .prop_map(|(id, a)| Step::Grant(id, a)),
            id.prop_map(Step::Deny),
        ]
    }

    fn to_signal(step: &Step) -> RawSignal {
        match step {
            Step::Insert(id) => signal(SignalChannel::Presence, *id, 1, "block id", None),
            Step::Remove(id) => signal(SignalChannel::Presence, *id, 3, "", None),
            Step::Grant(id, action) => {
                signal(SignalChannel::Policy, *id, 0, &format!("{action} id"), None)
            }
            // a policy change back to block does not resolve the device
            Step::Deny(id) => signal(SignalChannel::Policy, *id, 1, "block id", None),
        }
    }

    proptest! {
        #[test]
        fn replay_matches_last_event(steps in proptest::collection::vec(step(), 0..64)) {
            let registry = Registry::new();
            let interest = Interest::all();
            let mut expected: Vec<u32> = Vec::new();
            for step in &steps {
                if let Some(event) = decode(&to_signal(step), &interest) {
                    registry.apply(event);
                }
                match step {
                    Step::Insert(id) => {
                        if !expected.contains(id) {
                            expected.push(*id);
                        }
                    }
                    Step::Remove(id) | Step::Grant(id, _) => expected.retain(|e| e != id),
                    Step::Deny(_) => {}
                }
            }
            prop_assert_eq!(registry.ids(), expected);
        }

        #[test]
        fn decode_event_targets_signal_id(id in any::<u32>(), state in 0u32..5, rule in "\\PC*") {
            let s = signal(SignalChannel::Presence, id, state, &rule, None);
            if let Some(event) = decode(&s, &Interest::all()) {
                prop_assert_eq!(event.device_id(), id);
                if let DeviceEvent::Inserted(d) = event {
                    prop_assert!(d.attributes.name.is_none());
                }
            }
        }

        #[test]
        fn rule_parser_does_not_crash(rule in "\\PC*") {
            let _ = parse_rule(&rule);
        }

        #[test]
        fn quoted_name_round_trips(name in "[a-zA-Z0-9 ]{1,24}") {
            let rule = format!("block id 0781:5581 name \"{name}\" via-port \"1-2\"");
            let parsed = parse_rule(&rule).expect("rule");
            prop_assert_eq!(parsed.target, Action::Block);
            prop_assert_eq!(parsed.attributes.name.as_deref(), Some(name.as_str()));
        }
    }
}
