//! Testing utilities for data refresh runs.
//!
//! [`fakes::FakeServices`] implements every collaborator of the pipeline, records each call in
//! order and can be told to fail or block specific calls. [`refresh::TestRefresh`] wires it to
//! an in-memory history store together with a runner, an orchestrator and a cleanup service.

pub mod failpoints;
pub mod fakes;
pub mod notify;
pub mod refresh;
