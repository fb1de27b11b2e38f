pub mod encode;
pub mod format;
pub mod params;
pub mod probe;
pub mod run;
