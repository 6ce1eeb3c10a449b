use super::*;

fn config(method: ChunkingMethod, chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        method,
        chunk_size,
        chunk_overlap,
    }
}

#[test]
fn token_counting_splits_long_words() {
    assert_eq!(count_tokens(""), 0);
    assert_eq!(count_tokens("   \n\t  "), 0);
    assert_eq!(count_tokens("abcd"), 1);
    assert_eq!(count_tokens("abcde"), 2);
    assert_eq!(count_tokens("hello world"), 4);
}

#[test]
fn token_counting_handles_cjk_without_whitespace() {
    // 8 Hangul characters with no whitespace split into two 4-char tokens
    assert_eq!(count_tokens("인공지능기계학습"), 2);
}

#[test]
fn empty_text_yields_no_chunks() {
    let cfg = ChunkingConfig::default();
    assert!(chunk("", &cfg).unwrap().is_empty());
    assert!(chunk("   \n\n  ", &cfg).unwrap().is_empty());
}

#[test]
fn zero_chunk_size_is_rejected() {
    let cfg = config(ChunkingMethod::Sentence, 0, 0);
    let err = chunk("some text", &cfg).unwrap_err();
    assert!(matches!(err, RagError::Configuration(_)));
}

#[test]
fn overlap_at_least_chunk_size_is_rejected() {
    let cfg = config(ChunkingMethod::Token, 10, 12);
    let err = chunk("some text", &cfg).unwrap_err();
    assert!(matches!(err, RagError::Configuration(_)));

    let cfg = config(ChunkingMethod::Token, 10, 10);
    assert!(chunk("some text", &cfg).is_err());
}

#[test]
fn validation_happens_before_chunking_empty_text() {
    // Invalid config wins over the empty-text shortcut
    let cfg = config(ChunkingMethod::Sentence, 0, 0);
    assert!(chunk("", &cfg).is_err());
}

#[test]
fn chunking_is_deterministic() {
    let text = "First sentence here. Second sentence follows. Third one ends it. \
                Fourth keeps going. Fifth wraps up.";
    for method in [
        ChunkingMethod::Sentence,
        ChunkingMethod::Token,
        ChunkingMethod::Paragraph,
    ] {
        let cfg = config(method, 8, 2);
        let first = chunk(text, &cfg).unwrap();
        let second = chunk(text, &cfg).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn offsets_reconstruct_source_slices() {
    let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota kappa. \
                Lambda mu nu xi omicron pi.";
    for method in [
        ChunkingMethod::Sentence,
        ChunkingMethod::Token,
        ChunkingMethod::Paragraph,
    ] {
        let cfg = config(method, 6, 2);
        let chunks = chunk(text, &cfg).unwrap();
        assert!(!chunks.is_empty());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert!(c.start_index < c.end_index);
            assert_eq!(c.text, &text[c.start_index..c.end_index]);
            assert!(c.token_count > 0);
        }
        for pair in chunks.windows(2) {
            assert!(pair[0].start_index < pair[1].start_index);
        }
    }
}

#[test]
fn sentence_chunks_end_on_sentence_boundaries() {
    // Every word here is at most 4 characters, so one word is one token
    let text = "aa bb. cc dd. ee ff.";
    let cfg = config(ChunkingMethod::Sentence, 4, 0);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "aa bb. cc dd.");
    assert_eq!(chunks[1].text, "ee ff.");
}

#[test]
fn sentence_overlap_repeats_trailing_sentence() {
    let text = "aa bb. cc dd. ee ff.";
    let cfg = config(ChunkingMethod::Sentence, 4, 2);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "aa bb. cc dd.");
    // Second chunk re-includes the previous trailing sentence
    assert_eq!(chunks[1].text, "cc dd. ee ff.");
}

#[test]
fn oversized_sentence_is_hard_split() {
    let text = "aaaa bbbb cccc dddd eeee.";
    let cfg = config(ChunkingMethod::Sentence, 2, 1);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text, "aaaa bbbb");
    assert_eq!(chunks[1].text, "cccc dddd");
    assert_eq!(chunks[2].text, "eeee.");
}

#[test]
fn multilingual_sentence_endings_are_recognized() {
    let text = "인공지능은 기술이다\u{3002} 기계학습도 기술이다\u{FF01} 딥러닝은 어떨까\u{FF1F}";
    let cfg = config(ChunkingMethod::Sentence, 4, 0);
    let chunks = chunk(text, &cfg).unwrap();
    assert!(chunks.len() >= 2);
    assert!(chunks[0].text.starts_with("인공지능은"));
    // No chunk splits a sentence internally
    for c in &chunks {
        assert!(
            c.text.ends_with('\u{3002}') || c.text.ends_with('\u{FF01}') || c.text.ends_with('\u{FF1F}')
        );
    }
}

#[test]
fn token_windows_advance_by_size_minus_overlap() {
    let text = "a b c d e f g h i j";
    let cfg = config(ChunkingMethod::Token, 4, 1);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text, "a b c d");
    assert_eq!(chunks[1].text, "d e f g");
    assert_eq!(chunks[2].text, "g h i j");
    for c in &chunks {
        assert_eq!(c.token_count, 4);
    }
}

#[test]
fn token_window_clips_final_chunk() {
    let text = "a b c d e";
    let cfg = config(ChunkingMethod::Token, 3, 0);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "a b c");
    assert_eq!(chunks[1].text, "d e");
}

#[test]
fn paragraphs_split_on_blank_lines() {
    let text = "Para one.\n\nPara two.\n\nPara three.";
    let cfg = config(ChunkingMethod::Paragraph, 4, 0);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "Para one.\n\nPara two.");
    assert_eq!(chunks[1].text, "Para three.");
}

#[test]
fn small_paragraphs_merge_up_to_budget() {
    let text = "Para one.\n\nPara two.\n\nPara three.";
    let cfg = config(ChunkingMethod::Paragraph, 100, 10);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, text);
}

#[test]
fn oversized_paragraph_falls_back_to_token_windows() {
    let text = "aaaa bbbb cccc dddd eeee ffff";
    let cfg = config(ChunkingMethod::Paragraph, 3, 1);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text, "aaaa bbbb cccc");
    assert_eq!(chunks[1].text, "cccc dddd eeee");
    assert_eq!(chunks[2].text, "eeee ffff");
}

#[test]
fn blank_lines_with_whitespace_still_separate_paragraphs() {
    let text = "First paragraph here.\n   \t\nSecond paragraph here.";
    let cfg = config(ChunkingMethod::Paragraph, 10, 0);
    let chunks = chunk(text, &cfg).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "First paragraph here.");
    assert_eq!(chunks[1].text, "Second paragraph here.");
}

#[test]
fn chunking_method_parses_and_displays() {
    assert_eq!("sentence".parse::<ChunkingMethod>().unwrap(), ChunkingMethod::Sentence);
    assert_eq!("token".parse::<ChunkingMethod>().unwrap(), ChunkingMethod::Token);
    assert_eq!("paragraph".parse::<ChunkingMethod>().unwrap(), ChunkingMethod::Paragraph);
    assert_eq!(ChunkingMethod::Paragraph.to_string(), "paragraph");

    let err = "semantic".parse::<ChunkingMethod>().unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[test]
fn default_config_matches_deployment_defaults() {
    let cfg = ChunkingConfig::default();
    assert_eq!(cfg.method, ChunkingMethod::Sentence);
    assert_eq!(cfg.chunk_size, 512);
    assert_eq!(cfg.chunk_overlap, 50);
    assert!(cfg.validate().is_ok());
}
