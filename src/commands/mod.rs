pub mod generate;
pub mod quality;
pub mod report;
pub mod run;
pub mod scenarios;

mod harness;
