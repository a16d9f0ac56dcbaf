pub mod mdl_parser;

pub use mdl_parser::{parse_fragment, parse_instruction, MdlParser, Rule};
