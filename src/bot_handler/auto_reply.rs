use crate::storage::KeywordReply;

/// Finds the first keyword contained in `text`, ignoring case. Keywords are
/// checked in the order they are given.
pub fn find_reply<'a>(keywords: &'a [KeywordReply], text: &str) -> Option<&'a KeywordReply> {
    let text = text.to_lowercase();
    keywords
        .iter()
        .find(|reply| !reply.keyword.is_empty() && text.contains(&reply.keyword.to_lowercase()))
}
