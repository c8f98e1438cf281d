//! Practice material built from a subject's notes when no model is
//! available: a fill-in-the-blank quiz, a bullet summary, and concept
//! prompts.

use crate::{Segment, StudioTask};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

const QUIZ_QUESTIONS: usize = 5;
const QUIZ_DISTRACTORS: usize = 3;
const MIN_QUIZ_SENTENCE_CHARS: usize = 60;
const MIN_QUIZ_WORD_CHARS: usize = 6;
const FACT_MARKERS: [&str; 4] = [" is ", " are ", " called ", " consists of "];
const OPTION_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];
const BLANK: &str = "__________";

const SUMMARY_ITEMS: usize = 5;
const SUMMARY_ITEM_CHARS: usize = 200;
const CONCEPT_ITEMS: usize = 2;

pub fn studio_instruction(task: StudioTask) -> &'static str {
    match task {
        StudioTask::Mcq => "5 multiple choice questions with answers",
        StudioTask::Short => "2 short question and answer pairs",
        StudioTask::Summary => "a detailed bullet summary",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
}

pub fn local_material<R: Rng + ?Sized>(
    task: StudioTask,
    notes: &[Segment],
    context: &str,
    rng: &mut R,
) -> String {
    match task {
        StudioTask::Mcq => format!("**LOCAL PRACTICE QUIZ**\n\n{}", format_quiz(&local_quiz(context, rng))),
        StudioTask::Summary => format!("**LOCAL SUMMARY**\n\n{}", local_summary(notes)),
        StudioTask::Short => format!("**KEY CONCEPTS**\n\n{}", key_concepts(notes)),
    }
}

/// Splits after `.`, `!` or `?` when followed by a space.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek() == Some(&' ') {
            while chars.peek() == Some(&' ') {
                chars.next();
            }
            sentences.push(std::mem::take(&mut current));
        }
    }

    if !current.trim().is_empty() {
        sentences.push(current);
    }

    sentences
        .into_iter()
        .map(|sentence| sentence.trim().to_string())
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

fn strip_word(word: &str) -> &str {
    word.trim_matches(|ch| matches!(ch, '.' | ',' | '(' | ')' | '"'))
}

fn long_words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(strip_word)
        .filter(|word| word.chars().count() > MIN_QUIZ_WORD_CHARS)
}

pub fn local_quiz<R: Rng + ?Sized>(context: &str, rng: &mut R) -> Vec<QuizQuestion> {
    let sentences = split_sentences(context)
        .into_iter()
        .filter(|sentence| sentence.chars().count() > MIN_QUIZ_SENTENCE_CHARS)
        .collect::<Vec<_>>();

    let mut candidates = sentences
        .iter()
        .filter(|sentence| {
            let lowered = sentence.to_lowercase();
            FACT_MARKERS.iter().any(|marker| lowered.contains(marker))
        })
        .collect::<Vec<_>>();
    if candidates.len() < QUIZ_QUESTIONS {
        candidates = sentences.iter().take(10).collect();
    }
    candidates.shuffle(rng);

    let vocabulary = long_words(context).collect::<BTreeSet<_>>();

    let mut questions = Vec::new();
    for sentence in candidates.into_iter().take(QUIZ_QUESTIONS) {
        let words = long_words(sentence).collect::<Vec<_>>();
        let Some(answer) = words.choose(rng).copied() else {
            continue;
        };

        let mut distractors = vocabulary
            .iter()
            .filter(|word| !word.eq_ignore_ascii_case(answer))
            .copied()
            .collect::<Vec<_>>();
        distractors.shuffle(rng);

        let mut options = distractors
            .into_iter()
            .take(QUIZ_DISTRACTORS)
            .map(str::to_string)
            .collect::<Vec<_>>();
        options.push(answer.to_string());
        options.shuffle(rng);

        questions.push(QuizQuestion {
            prompt: sentence.replacen(answer, BLANK, 1),
            options,
            answer: answer.to_string(),
        });
    }

    questions
}

pub fn format_quiz(questions: &[QuizQuestion]) -> String {
    if questions.is_empty() {
        return "Not enough complete sentences in your notes to build a quiz yet.".to_string();
    }

    questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let options = question
                .options
                .iter()
                .zip(OPTION_LABELS)
                .map(|(option, label)| format!("{label}) {option}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "**QUESTION {}**\n{}\n\n{}\n\n**Correct Answer:** {}",
                index + 1,
                question.prompt,
                options,
                question.answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub fn local_summary(notes: &[Segment]) -> String {
    notes
        .iter()
        .take(SUMMARY_ITEMS)
        .map(|segment| {
            let mut item = segment.text.chars().take(SUMMARY_ITEM_CHARS).collect::<String>();
            if segment.text.chars().count() > SUMMARY_ITEM_CHARS {
                item.push_str("...");
            }
            format!("• {item}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn key_concepts(notes: &[Segment]) -> String {
    let concepts = notes
        .iter()
        .filter(|segment| segment.text.to_lowercase().contains(" is "))
        .take(CONCEPT_ITEMS)
        .map(|segment| format!("**Concept**\nExplain this: {}", segment.text))
        .collect::<Vec<_>>();

    if concepts.is_empty() {
        "No definitions found in your notes yet.".to_string()
    } else {
        concepts.join("\n\n")
    }
}
