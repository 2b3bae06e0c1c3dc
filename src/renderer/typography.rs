pub(crate) const SINGLE_QUOTE_OPENING: &str = "‘";
pub(crate) const SINGLE_QUOTE_CLOSING: &str = "’";
pub(crate) const APOSTROPHE: &str = "’";
pub(crate) const DOUBLE_QUOTE_OPENING: &str = "“";
pub(crate) const DOUBLE_QUOTE_CLOSING: &str = "”";

pub(crate) const FOOTNOTE_OPEN: &str = " ❲";
pub(crate) const FOOTNOTE_CLOSE: &str = "❳ ";

pub(crate) const RULE_CHAR: char = '━';
pub(crate) const RULE_WIDTH: usize = 70;

/// Replacement for a typographic entity, if one is known.
pub(crate) fn entity(text: &str) -> Option<&'static str> {
    let replacement = match text {
        "<->" => "↔",
        "->" => "→",
        "<-" => "←",
        "<=>" => "⇔",
        "=>" => "⇒",
        "<=" => "⇐",
        ">>" => "»",
        "<<" => "«",
        "---" => "—",
        "--" => "–",
        "(c)" => "©",
        "(tm)" => "™",
        "(r)" => "®",
        "..." => "…",
        _ => return None,
    };
    Some(replacement)
}
