pub mod custom_cup;
pub mod intake_event;
