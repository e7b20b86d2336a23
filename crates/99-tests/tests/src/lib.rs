//! End-to-end tests that drive both ends of the shared-memory channel: the
//! academy on the simulation side, a scripted trainer on the other.

#[cfg(test)]
mod trainer;

#[cfg(test)]
mod conformance;

#[cfg(test)]
mod academy_e2e;
