//! Reranker tests.
//!
//! Scoring, windowing and fusion building blocks.

use super::*;
use crate::error::RetrievalError;
use crate::mock::MockReranker;
use crate::types::Document;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn docs(contents: &[&str]) -> Vec<Document> {
    contents
        .iter()
        .enumerate()
        .map(|(i, c)| Document::new(format!("d{}", i), *c))
        .collect()
}

// =========== Config Tests ===========

#[test]
fn test_rerank_config_defaults() {
    let config = RerankConfig::default();
    assert_eq!(config.model, DEFAULT_RERANK_MODEL);
    assert!(config.api_key.is_none());
    assert_eq!(config.timeout_secs, 120);
}

#[test]
fn test_aliyun_preset() {
    let config = RerankConfig::aliyun("k");
    assert!(config.base_url.unwrap().contains("dashscope.aliyuncs.com"));
    assert_eq!(config.model, "gte-rerank-v2");
    assert_eq!(config.api_key.as_deref(), Some("k"));
}

#[test]
fn test_endpoint_appends_rerank_route() {
    let config = RerankConfig::default().with_base_url("http://localhost:8080/v1/");
    assert_eq!(config.endpoint().unwrap(), "http://localhost:8080/v1/rerank");

    let config = RerankConfig::default().with_base_url("http://gw/rerank");
    assert_eq!(config.endpoint().unwrap(), "http://gw/rerank");
}

#[test]
#[serial]
fn test_resolve_env_fallbacks() {
    std::env::set_var(RERANK_API_KEY_ENV, "env-key");
    std::env::set_var(RERANK_BASE_URL_ENV, "http://env-host");
    let resolved = RerankConfig::default().resolve_env().unwrap();
    std::env::remove_var(RERANK_API_KEY_ENV);
    std::env::remove_var(RERANK_BASE_URL_ENV);

    assert_eq!(resolved.api_key.as_deref(), Some("env-key"));
    assert_eq!(resolved.base_url.as_deref(), Some("http://env-host"));
}

#[test]
#[serial]
fn test_missing_base_url_is_config_error() {
    std::env::remove_var(RERANK_BASE_URL_ENV);
    let err = RerankConfig::default().resolve_env().unwrap_err();
    assert!(matches!(err, RetrievalError::ConfigError(_)));
    assert!(HttpReranker::new(RerankConfig::default()).is_err());
}

#[test]
fn test_sub_chunk_config_validation() {
    assert!(SubChunkConfig::default().validate().is_ok());
    assert!(SubChunkConfig::default().with_window(0, 0).validate().is_err());
    assert!(SubChunkConfig::default().with_batch_size(0).validate().is_err());
    assert!(SubChunkConfig::default().with_score_threshold(1.2).validate().is_err());
}

#[test]
fn test_aggregate_strategy_names() {
    let parsed: AggregateStrategy = serde_json::from_str("\"topk_mean\"").unwrap();
    assert_eq!(parsed, AggregateStrategy::TopKMean);
    assert_eq!(AggregateStrategy::TopKMean.to_string(), "topk_mean");
    assert!(serde_json::from_str::<AggregateStrategy>("\"median\"").is_err());
}

// =========== BM25 Tests ===========

#[test]
fn test_bm25_quick_fox() {
    let corpus = [
        "the quick brown fox jumps over the lazy dog",
        "a lazy afternoon in the park",
        "quick thinking and a clever fox",
        "stock market report for tuesday",
    ];
    let scores = Bm25Scorer::new(&corpus, Bm25Params::default()).score("quick fox");

    assert!(scores[0] > 0.0 && scores[2] > 0.0);
    assert_eq!(scores[1], 0.0);
    assert_eq!(scores[3], 0.0);
    assert!(scores[0].min(scores[2]) > scores[1].max(scores[3]));
}

#[test]
fn test_bm25_more_occurrences_score_higher() {
    let corpus = ["fox fox fox cat", "fox dog bird cat", "owl owl owl owl"];
    let scores = Bm25Scorer::new(&corpus, Bm25Params::default()).score("fox");
    assert!(scores[0] >= scores[1]);
    assert!(scores[1] > scores[2]);
}

#[test]
fn test_bm25_rare_terms_weigh_more() {
    let corpus = [
        "the peugeot 2008 envy is a great car",
        "peugeot makes many cars",
        "peugeot 208 is also available",
    ];
    let scores = Bm25Scorer::new(&corpus, Bm25Params::default()).score("peugeot envy");
    assert!(scores[0] > scores[1] * 1.5);
}

#[test]
fn test_bm25_unmatched_query_scores_zero() {
    let corpus = ["alpha beta", "gamma delta"];
    let scores = Bm25Scorer::new(&corpus, Bm25Params::default()).score("omega");
    assert_eq!(scores, vec![0.0, 0.0]);

    let scores = Bm25Scorer::new(&corpus, Bm25Params::default()).score("");
    assert_eq!(scores, vec![0.0, 0.0]);
}

#[test]
fn test_bm25_repeated_query_terms_count_once() {
    let corpus = ["fox den", "wolf den"];
    let scorer = Bm25Scorer::new(&corpus, Bm25Params::default());
    assert_eq!(scorer.score("fox"), scorer.score("fox fox FOX"));
}

#[test]
fn test_bm25_empty_corpus_and_empty_docs() {
    let empty: [&str; 0] = [];
    let scorer = Bm25Scorer::new(&empty, Bm25Params::default());
    assert!(scorer.is_empty());
    assert!(scorer.score("anything").is_empty());

    let scores = Bm25Scorer::new(&["", ""], Bm25Params::default()).score("fox");
    assert_eq!(scores, vec![0.0, 0.0]);
}

#[test]
fn test_tokenize_without_stemming() {
    let tokens = tokenize("Hello, World! Test-123 running véhicule");
    assert_eq!(tokens, vec!["hello", "world", "test", "123", "running", "véhicule"]);
    assert!(tokenize(" ,.;- ").is_empty());
}

#[test]
fn test_normalize_scores() {
    let normalized = normalize_scores(&[2.0, 1.0, 0.0, 4.0]);
    assert_eq!(normalized, vec![0.5, 0.25, 0.0, 1.0]);

    assert_eq!(normalize_scores(&[0.0, 0.0]), vec![0.0, 0.0]);
    assert!(normalize_scores(&[]).is_empty());
}

// =========== Window Tests ===========

#[test]
fn test_short_content_is_one_window() {
    let windows = split_into_sub_chunks("short text", 250, 50, 0);
    assert_eq!(windows, vec!["short text"]);

    let exact = "x".repeat(250);
    assert_eq!(split_into_sub_chunks(&exact, 250, 50, 0), vec![exact.clone()]);
    assert!(split_into_sub_chunks("", 250, 50, 0).is_empty());
}

#[test]
fn test_windows_slide_and_end_at_content_end() {
    let content: String = (0..600).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let windows = split_into_sub_chunks(&content, 250, 50, 0);

    // starts at 0, 200, 400; the third ends at 600
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0], content[0..250]);
    assert_eq!(windows[1], content[200..450]);
    assert_eq!(windows[2], content[400..600]);
    assert!(content.ends_with(windows.last().unwrap().as_str()));
}

#[test]
fn test_overlap_at_least_size_means_no_overlap() {
    let content = "abcdefghij";
    assert_eq!(split_into_sub_chunks(content, 4, 4, 0), vec!["abcd", "efgh", "ij"]);
    assert_eq!(split_into_sub_chunks(content, 4, 9, 0), vec!["abcd", "efgh", "ij"]);
}

#[test]
fn test_window_cap() {
    let content = "a".repeat(2000);
    assert_eq!(split_into_sub_chunks(&content, 250, 50, 3).len(), 3);
    assert_eq!(split_into_sub_chunks(&content, 250, 50, 0).len(), 10);
}

#[test]
fn test_windows_count_characters_not_bytes() {
    let content = "知识库检索重排序模型";
    let windows = split_into_sub_chunks(content, 4, 1, 0);
    assert_eq!(windows, vec!["知识库检", "检索重排", "排序模型"]);
}

// =========== Filter / Aggregate Tests ===========

#[test]
fn test_relative_filter() {
    assert_eq!(filter_low_score_windows(&[0.9, 0.5, 0.6], 0.6), vec![0.9, 0.6]);
    assert_eq!(filter_low_score_windows(&[0.9, 0.1], 0.0), vec![0.9, 0.1]);
    assert_eq!(filter_low_score_windows(&[0.0, 0.0], 0.6), vec![0.0, 0.0]);
    assert!(filter_low_score_windows(&[], 0.6).is_empty());
}

#[test]
fn test_relative_filter_never_empties() {
    for scores in [vec![0.3], vec![1.0, 0.1, 0.2], vec![-0.5, -0.2]] {
        let kept = filter_low_score_windows(&scores, 0.99);
        assert!(!kept.is_empty());
    }
    // all negative: nothing reaches max * threshold, the max survives
    assert_eq!(filter_low_score_windows(&[-0.5, -0.2], 0.99), vec![-0.2]);
}

#[test]
fn test_aggregate_strategies() {
    let scores = [0.9, 0.3, 0.6];
    assert_eq!(aggregate_scores(&scores, AggregateStrategy::Max, 2), 0.9);
    assert!((aggregate_scores(&scores, AggregateStrategy::Mean, 2) - 0.6).abs() < 1e-12);
    assert!((aggregate_scores(&scores, AggregateStrategy::TopKMean, 2) - 0.75).abs() < 1e-12);
    // K larger than the window count averages everything
    assert!((aggregate_scores(&scores, AggregateStrategy::TopKMean, 10) - 0.6).abs() < 1e-12);
    // K of 0 falls back to 2
    assert!((aggregate_scores(&scores, AggregateStrategy::TopKMean, 0) - 0.75).abs() < 1e-12);
    assert_eq!(aggregate_scores(&[], AggregateStrategy::Max, 2), 0.0);
}

#[test]
fn test_aggregate_ordering_property() {
    let lists = [
        vec![0.1, 0.7, 0.4, 0.9],
        vec![0.5, 0.5, 0.2],
        vec![0.33, 0.01, 0.98, 0.45, 0.6],
    ];
    for scores in lists {
        let max = aggregate_scores(&scores, AggregateStrategy::Max, 2);
        let mean = aggregate_scores(&scores, AggregateStrategy::Mean, 2);
        let topk = aggregate_scores(&scores, AggregateStrategy::TopKMean, 2);
        assert!(max >= topk && topk >= mean);
    }
}

// =========== Sub-chunk Reranker Tests ===========

#[tokio::test]
async fn test_sub_chunk_rerank_scores_by_best_window() {
    let long = format!("{} quick fox here", "filler ".repeat(100));
    let candidates = docs(&["nothing relevant", long.as_str(), "quick fox"]);
    let reranker = MockReranker::new();
    let sub_chunk = SubChunkReranker::new(Arc::new(reranker.clone()));

    let ranked = sub_chunk
        .rerank_with_sub_chunks("quick fox", candidates, 0, &SubChunkConfig::default())
        .await
        .unwrap();

    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].score, 1.0);
    assert_eq!(ranked[1].score, 1.0);
    // stable: d1 came before d2
    assert_eq!(ranked[0].id, "d1");
    assert_eq!(ranked[2].id, "d0");
    assert_eq!(ranked[2].score, 0.0);
}

#[tokio::test]
async fn test_sub_chunk_batches_of_thirty() {
    let contents: Vec<String> = (0..70).map(|i| format!("passage {}", i)).collect();
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    let reranker = MockReranker::new();
    let sub_chunk = SubChunkReranker::new(Arc::new(reranker.clone()));

    let ranked = sub_chunk
        .rerank_with_sub_chunks("passage", docs(&refs), 5, &SubChunkConfig::default())
        .await
        .unwrap();

    assert_eq!(ranked.len(), 5);
    let mut sizes: Vec<usize> = reranker.batches().await.iter().map(Vec::len).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(sizes, vec![30, 30, 10]);
}

#[tokio::test(start_paused = true)]
async fn test_sub_chunk_batches_overlap_in_time() {
    let contents: Vec<String> = (0..70).map(|i| format!("passage {}", i)).collect();
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    let reranker = MockReranker::new().with_latency(Duration::from_secs(1));
    let sub_chunk = SubChunkReranker::new(Arc::new(reranker.clone()));

    let started = tokio::time::Instant::now();
    let ranked = sub_chunk
        .rerank_with_sub_chunks("passage", docs(&refs), 5, &SubChunkConfig::default())
        .await
        .unwrap();

    assert_eq!(ranked.len(), 5);
    assert_eq!(reranker.call_count(), 3);
    // Three one-second batches, awaited together.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_sub_chunk_maps_windows_back_to_owner() {
    // d0 splits into 3 windows; only its last window matches.
    let d0 = format!("{}{}", "x".repeat(450), "target");
    let candidates = docs(&[d0.as_str(), "plain"]);
    let reranker = MockReranker::new()
        .with_passage_score("target", 0.8)
        .with_passage_score("plain", 0.3)
        .with_passage_score("x", 0.1);
    let sub_chunk = SubChunkReranker::new(Arc::new(reranker.clone()));

    let config = SubChunkConfig::default().with_batch_size(2);
    let ranked = sub_chunk
        .rerank_with_sub_chunks("q", candidates, 0, &config)
        .await
        .unwrap();

    assert_eq!(ranked[0].id, "d0");
    assert!((ranked[0].score - 0.8).abs() < 1e-12);
    assert!((ranked[1].score - 0.3).abs() < 1e-12);
    assert_eq!(reranker.call_count(), 2);
}

#[tokio::test]
async fn test_sub_chunk_mean_respects_relative_filter() {
    let d0 = format!("{}{}", "a".repeat(200), "b".repeat(200));
    let reranker = MockReranker::new()
        .with_passage_score("bbbbb", 0.8)
        .with_passage_score("aaaaa", 0.1);
    let sub_chunk = SubChunkReranker::new(Arc::new(reranker));

    let config = SubChunkConfig::default()
        .with_window(100, 0)
        .with_strategy(AggregateStrategy::Mean);
    let ranked = sub_chunk
        .rerank_with_sub_chunks("q", docs(&[d0.as_str()]), 0, &config)
        .await
        .unwrap();

    // windows: aaaa, aaaa, bbbb, bbbb -> 0.1, 0.1, 0.8, 0.8; 0.1 < 0.8 × 0.6 is dropped
    assert!((ranked[0].score - 0.8).abs() < 1e-12);
}

#[tokio::test]
async fn test_sub_chunk_batch_failure_fails_whole_call() {
    let contents: Vec<String> = (0..45).map(|i| format!("passage {}", i)).collect();
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    let sub_chunk = SubChunkReranker::new(Arc::new(MockReranker::new().fail_on_call(2)));

    let err = sub_chunk
        .rerank_with_sub_chunks("passage", docs(&refs), 5, &SubChunkConfig::default())
        .await
        .unwrap_err();

    match err {
        RetrievalError::Rerank { batch, .. } => assert!(batch.is_some()),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_sub_chunk_empty_inputs() {
    let reranker = MockReranker::new();
    let sub_chunk = SubChunkReranker::new(Arc::new(reranker.clone()));

    let ranked = sub_chunk
        .rerank_with_sub_chunks("q", vec![], 5, &SubChunkConfig::default())
        .await
        .unwrap();
    assert!(ranked.is_empty());

    // documents without content have no windows and score 0
    let ranked = sub_chunk
        .rerank_with_sub_chunks("q", docs(&["", ""]), 5, &SubChunkConfig::default())
        .await
        .unwrap();
    assert_eq!(ranked.len(), 2);
    assert!(ranked.iter().all(|d| d.score == 0.0));
    assert_eq!(reranker.call_count(), 0);
}

// =========== RRF Tests ===========

#[test]
fn test_rrf_first_in_both_scores_one() {
    let pass1 = docs(&["a", "b", "c"]);
    let pass2 = vec![
        Document::new("d0", "a"),
        Document::new("d2", "c"),
        Document::new("d1", "b"),
    ];
    let fused = RrfFusion::new().fuse(vec![pass1, pass2]);

    assert_eq!(fused[0].id, "d0");
    assert!((fused[0].score - 1.0).abs() < 1e-12);
    assert!(fused.iter().all(|d| d.score <= 1.0));
}

#[test]
fn test_rrf_single_pass_scores_less() {
    let pass1 = vec![Document::new("both", ""), Document::new("only1", "")];
    let pass2 = vec![Document::new("both", ""), Document::new("only2", "")];
    let fused = RrfFusion::new().fuse(vec![pass1, pass2]);

    let score = |id: &str| fused.iter().find(|d| d.id == id).unwrap().score;
    let rrf = RrfFusion::new();
    let single_rank_two = rrf.rank_score(2) / (2.0 / (rrf.k() + 1.0));
    assert!((score("only1") - single_rank_two).abs() < 1e-12);
    assert!(score("only1") <= score("both"));
    assert_eq!(score("only1"), score("only2"));
}

#[test]
fn test_rrf_dedups_within_pass() {
    let pass = vec![
        Document::new("a", "first"),
        Document::new("a", "dup"),
        Document::new("b", ""),
    ];
    let fused = RrfFusion::new().fuse(vec![pass]);

    assert_eq!(fused.len(), 2);
    assert_eq!(fused[0].content, "first");
    // b is rank 2 after dedup, not rank 3
    let expected = (1.0 / 62.0) / (1.0 / 61.0);
    assert!((fused[1].score - expected).abs() < 1e-12);
}

#[test]
fn test_rrf_k_floor() {
    assert_eq!(RrfFusion::with_k(0.5).k(), 1.0);
    assert_eq!(RrfFusion::with_k(1.0).k(), 1.0);
    assert_eq!(RrfFusion::with_k(60.0).k(), 60.0);
}

#[test]
fn test_rrf_empty() {
    assert!(RrfFusion::new().fuse(vec![]).is_empty());
    assert!(RrfFusion::new().fuse(vec![vec![], vec![]]).is_empty());
}

// =========== Hybrid Tests ===========

#[test]
fn test_weight_extremes() {
    assert!(WeightedFusion::new(1.0).is_pure_rerank());
    assert!(WeightedFusion::new(0.9999999).is_pure_rerank());
    assert!(WeightedFusion::new(0.0).is_pure_lexical());
    assert!(!WeightedFusion::new(0.5).is_pure_rerank());
    assert!(!WeightedFusion::new(0.5).is_pure_lexical());
    assert_eq!(WeightedFusion::new(3.0).rerank_weight(), 1.0);
}

#[test]
fn test_fuse_reproduces_pure_orderings() {
    let reranked = vec![
        Document::new("a", "").with_score(0.9),
        Document::new("b", "").with_score(0.5),
        Document::new("c", "").with_score(0.1),
    ];
    let lexical = vec![
        Document::new("a", "").with_score(0.0),
        Document::new("b", "").with_score(0.2),
        Document::new("c", "").with_score(1.0),
    ];

    let ids = |d: &[Document]| d.iter().map(|x| x.id.clone()).collect::<Vec<_>>();

    let pure_rerank = WeightedFusion::new(1.0).fuse(reranked.clone(), &lexical);
    assert_eq!(ids(&pure_rerank), vec!["a", "b", "c"]);

    let pure_lexical = WeightedFusion::new(0.0).fuse(reranked.clone(), &lexical);
    assert_eq!(ids(&pure_lexical), vec!["c", "b", "a"]);

    let blended = WeightedFusion::new(0.5).fuse(reranked, &lexical);
    let c = blended.iter().find(|d| d.id == "c").unwrap();
    assert!((c.score - 0.55).abs() < 1e-12);
}

#[test]
fn test_score_lexical_keeps_input_order() {
    let scored = score_lexical(
        "quick fox",
        docs(&["slow turtle", "quick fox", "fox"]),
        Bm25Params::default(),
    );

    let ids: Vec<&str> = scored.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["d0", "d1", "d2"]);
    assert_eq!(scored[0].score, 0.0);
    assert_eq!(scored[1].score, 1.0);
    assert!(scored[2].score > 0.0 && scored[2].score < 1.0);
}
