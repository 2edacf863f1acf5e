// Reply generation
//
// The server only needs something implementing `parley_core::Responder`;
// the scripted demo responder is the default.

pub mod mock;

pub use mock::MockResponder;
