pub mod command;
pub mod demux;
pub mod dts;
pub mod info;
