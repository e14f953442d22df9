pub mod defs;
pub mod reconcile;

pub use defs::{
    color_for_name, DefsError, FrameRange, ObjClass, ProjectMeta, TagApplicableTo, TagMeta, TagValue, TagValueType,
};
pub use reconcile::{reconcile, Divergence, Reconciliation};

// Object style note:
// Everything in this crate is a plain value. Nothing here talks to the
// platform; callers decide what to send based on what these functions return.
