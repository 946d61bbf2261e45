pub mod argument;
pub mod net_def;
pub mod network;
pub mod weights;
