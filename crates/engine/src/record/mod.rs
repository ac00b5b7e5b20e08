mod action;
mod descriptor;
mod format;
mod snapshot;

pub use action::{
    ActionRecord, AttemptKey, RawActionFields, NAME_ELEMENT, OBJECT_ELEMENT, START_STATE_ACTION,
    STATE_ACTION, TIME_FORMAT,
};
pub use descriptor::{DescriptorError, EntityDescriptor, Pose, NO_TEMPLATE_TAG, NO_WORLD_TAG};
pub use format::{
    format_event, format_log, format_object, format_time, format_transform, EVENT_ELEMENT,
    LOG_ROOT,
};
pub use snapshot::{SnapshotNode, SnapshotParseError};
