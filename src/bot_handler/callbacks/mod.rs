pub mod cancel_broadcast;
pub mod close;
pub mod stored;
pub mod wiki_suggestion;
