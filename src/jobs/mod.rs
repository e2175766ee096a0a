pub mod price_watch;
