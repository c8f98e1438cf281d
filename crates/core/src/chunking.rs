use crate::models::{ChunkingConfig, Segment};

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Packs lines into parts of roughly `max_chars`. Lines shorter than
/// `min_line_chars` (page numbers, stray headers) are dropped; a part is
/// closed as soon as it grows past `max_chars`.
pub fn chunk_lines(text: &str, config: ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > config.min_line_chars)
    {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);

        if current.chars().count() > config.max_chars {
            chunks.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Splits segments longer than `max_chars` into line-packed parts. Each part
/// keeps its parent reference with a part number appended; segments that
/// already fit pass through untouched.
pub fn split_segments(segments: Vec<Segment>, config: ChunkingConfig) -> Vec<Segment> {
    let mut result = Vec::with_capacity(segments.len());

    for segment in segments {
        if segment.text.chars().count() <= config.max_chars {
            result.push(segment);
            continue;
        }

        let parts = chunk_lines(&segment.text, config);
        if parts.len() <= 1 {
            result.push(Segment {
                text: parts.into_iter().next().unwrap_or(segment.text),
                reference: segment.reference,
                page: segment.page,
            });
            continue;
        }

        for (index, part) in parts.into_iter().enumerate() {
            result.push(Segment {
                text: part,
                reference: format!("{}, part {}", segment.reference, index + 1),
                page: segment.page,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn short_lines_are_dropped_and_parts_close_past_the_limit() {
        let config = ChunkingConfig {
            max_chars: 30,
            min_line_chars: 10,
        };
        let text = "12\nThe first long line here\nsecond long line of text\nthird line is short-ish\n";

        let parts = chunk_lines(text, config);

        assert_eq!(
            parts,
            vec![
                "The first long line here second long line of text".to_string(),
                "third line is short-ish".to_string(),
            ]
        );
    }

    #[test]
    fn oversized_segments_get_numbered_parts() {
        let config = ChunkingConfig {
            max_chars: 30,
            min_line_chars: 5,
        };
        let long = "Chlorophyll absorbs light energy\nStomata regulate gas exchange\nXylem carries water upward";
        let segments = vec![
            Segment::new("short page", "bio.pdf, page 1"),
            Segment::new(long, "bio.pdf, page 2").with_page(2),
        ];

        let split = split_segments(segments, config);

        assert_eq!(split[0].reference, "bio.pdf, page 1");
        assert_eq!(split[1].reference, "bio.pdf, page 2, part 1");
        assert_eq!(split[1].text, "Chlorophyll absorbs light energy");
        assert_eq!(split[2].reference, "bio.pdf, page 2, part 2");
        assert_eq!(split[2].text, "Stomata regulate gas exchange Xylem carries water upward");
        assert!(split[1..].iter().all(|part| part.page == Some(2)));
        assert_eq!(split.len(), 3);
    }

    #[test]
    fn single_long_line_keeps_its_reference() {
        let config = ChunkingConfig {
            max_chars: 10,
            min_line_chars: 2,
        };
        let segments = vec![Segment::new("one unbroken line of notes", "a.txt")];

        let split = split_segments(segments, config);

        assert_eq!(split, vec![Segment::new("one unbroken line of notes", "a.txt")]);
    }
}
