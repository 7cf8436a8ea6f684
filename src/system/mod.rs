pub(crate) mod shutdown_handlers;
