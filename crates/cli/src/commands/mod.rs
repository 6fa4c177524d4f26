pub mod exec;
pub mod failing;
pub mod nodes;
pub mod troubleshoot;
