//! thermoor: a serial-bus thermal telemetry bridge.
//!
//! Reads temperature readings from a line-oriented sensor bus and forwards
//! the freshest per-probe values to a Zabbix server once per sampling cycle.
//! Cycle boundaries come from the wall clock; cycle completion is inferred
//! from an address repeating on the bus before the deadline rolls over.

pub mod agent;
pub mod bus;
pub mod collector;
pub mod config;
pub mod sink;
