//! Lowering tests
//!
//! Structure is checked on the emitted elements; reachability properties
//! (retry counts, iteration entries, stack balance) are checked by running
//! the produced graph through [`sim::Sim`].

mod helpers;
