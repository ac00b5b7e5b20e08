//! Writers for the recorded log format, used by recording hosts and to build
//! fixtures that the XML log source reads back.

use std::fmt::Write as _;

use chrono::NaiveDateTime;

use super::action::{RawActionFields, TIME_FORMAT};
use super::descriptor::{
    EntityDescriptor, ANGULAR_VELOCITY_ELEMENT, EXTRA_TAGS_ELEMENT, POSITION_ELEMENT,
    ROTATION_ELEMENT, TAG_ELEMENT, TEMPLATE_ELEMENT, TRANSFORM_ELEMENT, VELOCITY_ELEMENT,
    WORLD_TAG_ELEMENT,
};
use super::snapshot::escape_text;
use crate::world::Vec2;

pub const LOG_ROOT: &str = "Log";
pub const EVENT_ELEMENT: &str = "Event";

pub fn format_time(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIME_FORMAT).to_string()
}

/// `<Object>` element for one entity, in the layout snapshots are read with.
pub fn format_object(descriptor: &EntityDescriptor) -> String {
    let mut out = String::from("<Object>");
    push_element(&mut out, "Name", &descriptor.name);
    out.push_str(&format_transform(descriptor));
    if let Some(template) = &descriptor.template {
        push_element(&mut out, TEMPLATE_ELEMENT, template);
    }
    if let Some(world_tag) = &descriptor.world_tag {
        push_element(&mut out, WORLD_TAG_ELEMENT, world_tag);
    }
    if !descriptor.extra_tags.is_empty() {
        let _ = write!(out, "<{EXTRA_TAGS_ELEMENT}>");
        for tag in &descriptor.extra_tags {
            push_element(&mut out, TAG_ELEMENT, tag);
        }
        let _ = write!(out, "</{EXTRA_TAGS_ELEMENT}>");
    }
    out.push_str("</Object>");
    out
}

pub fn format_transform(descriptor: &EntityDescriptor) -> String {
    let pose = &descriptor.pose;
    let mut out = format!("<{TRANSFORM_ELEMENT}>");
    push_vec2(&mut out, POSITION_ELEMENT, pose.transform.position);
    push_element(
        &mut out,
        ROTATION_ELEMENT,
        &pose.transform.rotation_degrees.to_string(),
    );
    if let Some(velocity) = pose.velocity {
        push_vec2(&mut out, VELOCITY_ELEMENT, velocity);
    }
    if let Some(angular_velocity) = pose.angular_velocity {
        push_element(&mut out, ANGULAR_VELOCITY_ELEMENT, &angular_velocity.to_string());
    }
    let _ = write!(out, "</{TRANSFORM_ELEMENT}>");
    out
}

/// One `<Event>` element. Payloads that already look like markup are written
/// verbatim; anything else is escaped as text.
pub fn format_event(fields: &RawActionFields) -> String {
    let mut out = format!("<{EVENT_ELEMENT}>");
    push_element(&mut out, "Time", &fields.time);
    push_element(&mut out, "SessionID", &fields.session_id);
    push_element(&mut out, "UserID", &fields.user_id);
    push_element(&mut out, "TransactionID", &fields.transaction_id);
    push_element(&mut out, "LevelName", &fields.level_name);
    push_element(&mut out, "AttemptNumber", &fields.attempt_number);
    push_element(&mut out, "Selection", &fields.selection);
    push_element(&mut out, "Action", &fields.action);
    push_payload(&mut out, "Input", &fields.input);
    if !fields.state.is_empty() {
        push_payload(&mut out, "State", &fields.state);
    }
    let _ = write!(out, "</{EVENT_ELEMENT}>");
    out
}

/// A complete log document.
pub fn format_log<'a>(events: impl IntoIterator<Item = &'a RawActionFields>) -> String {
    let mut out = format!("<{LOG_ROOT}>\n");
    for event in events {
        out.push_str(&format_event(event));
        out.push('\n');
    }
    let _ = write!(out, "</{LOG_ROOT}>");
    out
}

fn looks_like_markup(payload: &str) -> bool {
    let trimmed = payload.trim();
    trimmed.starts_with('<') && trimmed.ends_with('>')
}

fn push_payload(out: &mut String, name: &str, payload: &str) {
    if looks_like_markup(payload) {
        let _ = write!(out, "<{name}>{payload}</{name}>");
    } else {
        push_element(out, name, payload);
    }
}

fn push_element(out: &mut String, name: &str, text: &str) {
    let _ = write!(out, "<{name}>{}</{name}>", escape_text(text));
}

fn push_vec2(out: &mut String, name: &str, value: Vec2) {
    let _ = write!(out, "<{name}><X>{}</X><Y>{}</Y></{name}>", value.x, value.y);
}
