//! Argument files
//!
//! Lets users keep flags in a text file and pass `@path` on the command line.
//! Each line is split like a shell would split it; a token starting with `#`
//! comments out the rest of its line.

pub mod expand;
pub mod tokenize;

pub use expand::{expand_arg_files, read_arg_file, ARG_FILE_PREFIX};
pub use tokenize::{split_words, tokenize, COMMENT_MARKER};
