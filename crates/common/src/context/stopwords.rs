//! Bilingual (German/English) keyword extraction

/// Function words dropped from queries before keyword fallback searches.
/// Tokens of two characters or fewer are dropped separately.
const STOPWORDS: &[&str] = &[
    // English
    "about", "above", "after", "again", "all", "also", "and", "any", "are", "because", "been",
    "before", "being", "below", "between", "both", "but", "can", "could", "did", "does", "doing",
    "down", "during", "each", "few", "for", "from", "further", "had", "has", "have", "having",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "into", "its", "itself",
    "just", "know", "let", "like", "more", "most", "much", "must", "myself", "nor", "not", "now",
    "off", "once", "only", "other", "our", "ours", "ourselves", "out", "over", "own", "same",
    "she", "should", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "too", "under",
    "until", "use", "used", "using", "very", "was", "way", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
    "yourself", "yourselves", "tell", "show", "find", "give", "get", "please",
    // German
    "aber", "alle", "allem", "allen", "aller", "alles", "als", "also", "ander", "andere",
    "anderem", "anderen", "anderer", "anderes", "auch", "auf", "aus", "bei", "bin", "bis",
    "bist", "da", "damit", "dann", "das", "dass", "dein", "deine", "dem", "den", "denn", "der",
    "des", "dich", "die", "dies", "diese", "diesem", "diesen", "dieser", "dieses", "dir", "doch",
    "dort", "durch", "ein", "eine", "einem", "einen", "einer", "eines", "euch", "euer", "eure",
    "für", "gibt", "hab", "habe", "haben", "hat", "hatte", "hier", "hin", "hinter", "ich",
    "ihm", "ihn", "ihnen", "ihr", "ihre", "ihrem", "ihren", "ihrer", "im", "immer", "ist",
    "jede", "jedem", "jeden", "jeder", "jedes", "jetzt", "kann", "kein", "keine", "können",
    "machen", "man", "manche", "mein", "meine", "mich", "mir", "mit", "muss", "nach", "nicht",
    "nichts", "noch", "nun", "nur", "ob", "oder", "ohne", "sehr", "sein", "seine", "sich",
    "sie", "sind", "so", "soll", "sollte", "sondern", "über", "um", "und", "uns", "unser",
    "unter", "viel", "vom", "von", "vor", "war", "waren", "warum", "was", "weil", "welche",
    "welchem", "welchen", "welcher", "welches", "wenn", "wer", "werde", "werden", "weshalb",
    "wie", "wieder", "wieso", "will", "wir", "wird", "wo", "wollen", "würde", "zu", "zum",
    "zur", "zwischen", "weiß", "wissen", "zeige", "gib",
];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Extract search keywords from a free-text query.
///
/// Lower-cases, splits on every non-alphanumeric character, keeps tokens longer
/// than two characters that are not stopwords, and drops repeats. Keywords
/// come back in first-occurrence order.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();

    for token in lowered.split(|c: char| !c.is_alphanumeric()) {
        if token.chars().count() <= 2 || is_stopword(token) {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }

    keywords
}
