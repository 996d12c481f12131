/*
 * This module provides data aquisition abilites for the poller.
 * It doesn't care what a MIB means, just how to reach a device and read it.
 * Credential discovery lives here too, since it is nothing more than a probe.
 */

pub mod core;
pub mod credentials;
#[cfg(test)]
pub mod mock;
pub mod normalize;
pub mod snmp;
