//! Overlay state for optimistic mutations.
//!
//! The merged view is the confirmed base with every in-flight mutation
//! applied on top. Keys with a mutation in flight are shielded from base
//! replacements until their remote operation settles.

mod overlay;

pub(crate) use overlay::OverlayState;
