mod common;
mod fallback;
