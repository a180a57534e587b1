pub(crate) mod decoding;
pub(crate) mod encoding;
pub mod packet_type;
pub mod qos;
pub(crate) mod validation;
