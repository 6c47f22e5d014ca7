pub(crate) mod admin;
pub(crate) mod ask;
pub(crate) mod chat;
pub(crate) mod diagnose;
pub(crate) mod serve;
pub(crate) mod tool;
