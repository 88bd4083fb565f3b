#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Collaborators of the block confirmation pipeline: the execution engine, the
//! high-availability conductor and the payload gossiper.

/// `AuthRPC` (engine API) connection
pub mod engine;

/// Sequencer conductor connection
pub mod conductor;

/// Background payload gossip
pub mod gossip;
