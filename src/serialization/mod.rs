//! Wire codecs for UDPTL, IFP and TPKT.

pub mod ifp;
pub mod tpkt;
pub mod udptl;

pub use ifp::{deserialize_ifp, serialize_ifp};
pub use tpkt::{serialize_tpkt, strip_tpkt};
pub use udptl::{deserialize_udptl, serialize_udptl};
