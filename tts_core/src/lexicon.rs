//! Phonetic respelling for Tagalog words the voices tend to mispronounce.

use std::sync::OnceLock;

use regex::Regex;

/// Applied in order; later entries see the output of earlier ones.
const TAGALOG_LEXICON: &[(&str, &str)] = &[
    // greetings
    ("mabuhay", "ma-boo-high"),
    ("kamusta", "kah-moos-tah"),
    ("salamat", "sAH-la-matt"),
    ("paalam", "pah-ah-lam"),
    ("po", "poh"),
    ("opo", "oh-poh"),
    ("walang", "wah-lang"),
    ("anuman", "ah-noo-mahn"),
    // particles
    ("ng", "nang"),
    ("mga", "ma-nga"),
    ("atbp", "at iba pa"),
    ("ay", "ai"),
    ("si", "see"),
    ("na", "nah"),
    ("din", "deen"),
    ("rin", "reen"),
    // pronouns
    ("ako", "ah-koh"),
    ("ikaw", "ee-kaoo"),
    ("tayo", "tah-yoh"),
    ("kami", "kah-mee"),
    ("siya", "shah"),
    ("nila", "nee-lah"),
    // frequent trouble spots
    ("buhay", "boo-hay"),
    ("puso", "poo-soh"),
    ("gabi", "gah-bee"),
    ("ganda", "gan-dah"),
    ("gusto", "goos-toh"),
    ("sakit", "sah-kit"),
    ("lakas", "la-kass"),
    ("lambing", "lam-bing"),
    ("wika", "wee-kah"),
    ("bayani", "bah-yah-nee"),
    ("dangal", "dah-ngahl"),
    ("tulong", "too-long"),
    ("mabuti", "ma-boo-tee"),
    ("pag-asa", "pag-ah-sah"),
    ("pag-ibig", "pag-ee-big"),
    ("kalayaan", "ka-lah-yahn"),
    ("bayan", "bah-yahn"),
    ("bayanihan", "bah-yah-nee-han"),
    ("kapayapaan", "ka-pah-yah-paan"),
    ("kalikasan", "ka-lee-kah-sahn"),
    ("kalusugan", "ka-loo-soo-gahn"),
    ("kaligtasan", "ka-lee-gta-sahn"),
    ("katarungan", "ka-tah-roo-ngan"),
    ("kagandahan", "ka-gan-dah-han"),
    ("kagalingan", "ka-gah-ling-an"),
    ("kagitingan", "ka-gee-ting-an"),
    ("kaginhawaan", "ka-gin-ha-wan"),
    // questions and direction
    ("saan", "sah-ahn"),
    ("kailan", "ka-ee-lan"),
    ("bakit", "bah-kit"),
    ("paano", "pah-ah-no"),
    ("kanino", "kah-nee-no"),
    ("dito", "dee-two"),
    ("doon", "doo-ohn"),
    ("magtanong", "mug-tah-nOng"),
    // time and nature
    ("ngayon", "ngah-yown"),
    ("bukas", "boo-kahs"),
    ("hapon", "hah-pohn"),
    ("tanghali", "tang-hah-lee"),
    ("umaga", "oo-mah-gah"),
    ("dagat", "dah-gaht"),
    ("langit", "lah-ngit"),
];

fn rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        TAGALOG_LEXICON
            .iter()
            .filter_map(|&(word, respelling)| {
                Regex::new(&format!(r"\b{}\b", regex::escape(word)))
                    .ok()
                    .map(|re| (re, respelling))
            })
            .collect()
    })
}

/// Lowercase `text` and replace whole-word lexicon entries with their
/// respelling.
pub fn apply_custom_phonetics(text: &str) -> String {
    let mut out = text.to_lowercase();
    for (re, respelling) in rules() {
        if re.is_match(&out) {
            out = re.replace_all(&out, regex::NoExpand(respelling)).into_owned();
        }
    }
    out
}
