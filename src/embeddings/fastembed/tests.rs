use super::*;

#[test]
fn resolves_reference_model() {
    let (model, dimension) = resolve_model("all-MiniLM-L6-v2").expect("should resolve");
    assert_eq!(model, EmbeddingModel::AllMiniLML6V2);
    assert_eq!(dimension, 384);
}

#[test]
fn resolves_prefixed_and_mixed_case_names() {
    let (model, _) =
        resolve_model("sentence-transformers/all-MiniLM-L6-v2").expect("should resolve");
    assert_eq!(model, EmbeddingModel::AllMiniLML6V2);

    let (model, dimension) = resolve_model("BAAI/BGE-Base-EN-v1.5").expect("should resolve");
    assert_eq!(model, EmbeddingModel::BGEBaseENV15);
    assert_eq!(dimension, 768);
}

#[test]
fn unknown_model_is_unavailable() {
    let result = resolve_model("definitely-not-a-model");
    assert!(matches!(result, Err(RagError::ModelUnavailable(_))));
}
