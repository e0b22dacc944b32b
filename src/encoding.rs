pub mod binary;
pub mod string;
pub mod variable_int;

pub use binary::{decode_binary, encode_binary};
pub use string::{decode_string, decode_string_pair, decode_string_with, encode_string, string_len};
pub use variable_int::{
    decode_variable_int, encode_variable_int, variable_int_len, VariableInt, VariableIntPeek,
    VARIABLE_INT_MAX, VARIABLE_INT_MAX_BYTES,
};
