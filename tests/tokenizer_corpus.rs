//! Frozen sentence segmentation of representative book paragraphs.
//!
//! The device numbers sentences with its own segmenter; these expectations
//! pin the splits our tokenizer must agree with, trailing whitespace
//! included.

use kobo2calibre::SentenceTokenizer;

const TEXT_1: &str = "In the year 1878 I took my degree of Doctor of Medicine of the University of \n\
London, and proceeded to Netley to go through the course prescribed for \n\
surgeons in the army. Having completed my studies there, I was duly attached to \n\
the Fifth Northumberland Fusiliers as Assistant Surgeon. The regiment was \n\
stationed in India at the time, and before I could join it, the second Afghan \n\
war had broken out. On landing at Bombay, I learned that my corps had advanced \n\
through the passes, and was already deep in the enemy\u{2019}s country. I followed, \n\
however, with many other officers who were in the same situation as myself, and \n \
succeeded in reaching Candahar in safety, where I found my regiment, and at \n\
once entered upon my new duties.";

const TEXT_2: &str = "\u{201c}Whatever have you been doing with yourself, Watson?\u{201d} he asked in undisguised \n\
wonder, as we rattled through the crowded London streets. \u{201c}You are as thin as a \n\
lath and as brown as a nut.\u{201d}";

const TEXT_3: &str = "As stated above, e.g. is short for \u{201c}for example.\u{201d}";

const TEXT_4: &str = "After work, I\u{2019}m going to try the new restaurant (i.e., All About Pasta) \n\
to decide on a venue for the reception.";

const TEXT_5: &str = "\u{201c}Oh! a mystery is it?\u{201d} I cried, rubbing my hands. \u{201c}This is very piquant. I am \n\
much obliged to you for bringing us together. \u{2018}The proper study of mankind is \n\
man,\u{2019} you know.\u{201d}";

fn tokenize(text: &str) -> Vec<&str> {
    let tokenizer = SentenceTokenizer::default();
    let sentences = tokenizer.tokenize(text);
    assert_eq!(sentences.concat(), text, "sentences must cover the input");
    sentences
}

#[test]
fn test_narrative_paragraph() {
    // The line continuation keeps the leading space of " succeeded"
    assert!(TEXT_1.contains("and \n succeeded"));
    assert_eq!(
        tokenize(TEXT_1),
        vec![
            "In the year 1878 I took my degree of Doctor of Medicine of the University of \n\
             London, and proceeded to Netley to go through the course prescribed for \n\
             surgeons in the army. ",
            "Having completed my studies there, I was duly attached to \n\
             the Fifth Northumberland Fusiliers as Assistant Surgeon. ",
            "The regiment was \n\
             stationed in India at the time, and before I could join it, the second Afghan \n\
             war had broken out. ",
            "On landing at Bombay, I learned that my corps had advanced \n\
             through the passes, and was already deep in the enemy\u{2019}s country. ",
            "I followed, \n\
             however, with many other officers who were in the same situation as myself, and \n \
             succeeded in reaching Candahar in safety, where I found my regiment, and at \n\
             once entered upon my new duties.",
        ]
    );
}

#[test]
fn test_dialogue_tag_continues_sentence() {
    assert_eq!(
        tokenize(TEXT_2),
        vec![
            "\u{201c}Whatever have you been doing with yourself, Watson?\u{201d} he asked in undisguised \n\
             wonder, as we rattled through the crowded London streets. ",
            "\u{201c}You are as thin as a \nlath and as brown as a nut.\u{201d}",
        ]
    );
}

#[test]
fn test_abbreviations_do_not_split() {
    assert_eq!(tokenize(TEXT_3), vec![TEXT_3]);
    assert_eq!(tokenize(TEXT_4), vec![TEXT_4]);
}

#[test]
fn test_nested_quotes() {
    assert_eq!(
        tokenize(TEXT_5),
        vec![
            "\u{201c}Oh! a mystery is it?\u{201d} ",
            "I cried, rubbing my hands. ",
            "\u{201c}This is very piquant. ",
            "I am \nmuch obliged to you for bringing us together. ",
            "\u{2018}The proper study of mankind is \nman,\u{2019} you know.\u{201d}",
        ]
    );
}

#[test]
fn test_quote_merge_needs_closing_sentence() {
    assert_eq!(
        tokenize("\u{201c}Oh! a mystery,\u{201d} he said."),
        vec!["\u{201c}Oh! ", "a mystery,\u{201d} he said."]
    );
}

#[test]
fn test_sentence_offsets_follow_corpus() {
    let tokenizer = SentenceTokenizer::default();
    let sentences = tokenizer.tokenize(TEXT_5);
    let second: usize = sentences[0].chars().count();
    assert_eq!(tokenizer.sentence_offset(TEXT_5, 2), second);
    assert_eq!(tokenizer.sentence_offset(TEXT_5, 99), TEXT_5.chars().count());
}
