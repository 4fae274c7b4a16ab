//! Keyword classifier for business intent.

const BUSINESS_KEYWORDS: &[&str] = &[
    "business", "startup", "company", "revenue", "profit", "customer", "client", "market",
    "marketing", "sales", "sell", "pricing", "price", "product", "launch", "funding", "investor",
    "invest", "budget", "cost", "growth", "strategy", "competitor", "brand", "entrepreneur",
    "idea", "plan", "hire", "hiring", "team", "cash flow", "margin", "b2b", "b2c", "saas",
    "ecommerce", "e-commerce", "pitch", "mvp", "valuation", "equity", "roi", "kpi",
    "partnership", "supplier", "inventory", "monetize", "subscription",
];

/// Whether `text` reads as a business question.
pub fn is_business_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    BUSINESS_KEYWORDS.iter().any(|keyword| {
        lower
            .match_indices(keyword)
            .any(|(i, _)| is_word_boundary(&lower, i, i + keyword.len()))
    })
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let starts_word = text[..start]
        .chars()
        .next_back()
        .is_none_or(|c| !c.is_alphanumeric());
    // Plural and verb forms count: "customers", "launched", "hiring".
    let rest = &text[end..];
    let ends_word = ["", "s", "es", "d", "ed", "ing"].iter().any(|suffix| {
        rest.strip_prefix(suffix)
            .is_some_and(|r| r.chars().next().is_none_or(|c| !c.is_alphanumeric()))
    });
    starts_word && ends_word
}
