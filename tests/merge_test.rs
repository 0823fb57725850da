//! Matrix Merge Integration Tests
//!
//! End-to-end builds over real files, plus multi-seed runs that merge
//! random subsequences of a canonical stream and check every row.

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pheno_matrix::bgzf::BgzfWriter;
use pheno_matrix::matrix::{MergeEngine, SourceInput, TextLineSource};
use pheno_matrix::{build_matrix, BuildOutcome, BuildRequest, MatrixConfig, MatrixError};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

const SITES: &str = "chrom\tpos\tref\talt\tgene\n\
                     1\t100\tA\tT\tBRCA1\n\
                     1\t200\tC\tG\tBRCA1\n\
                     2\t50\tG\tA\tTP53\n";

fn gunzip_file(path: &Path) -> String {
    let mut text = String::new();
    MultiGzDecoder::new(fs::File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

fn write_gzip(path: &Path, text: &str) {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn write_bgzf(path: &Path, text: &str) {
    let mut writer = BgzfWriter::new(fs::File::create(path).unwrap(), 6);
    writer.write(text.as_bytes()).unwrap();
    writer.close().unwrap();
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    /// Sites plus three sources, one per input encoding
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sites.tsv"), SITES).unwrap();
        fs::create_dir(dir.path().join("pheno")).unwrap();

        write_gzip(
            &dir.path().join("pheno/250.2.gz"),
            "chrom\tpos\tref\talt\tgene\tpval\n1\t100\tA\tT\tBRCA1\t0.01\n2\t50\tG\tA\tTP53\t0.5\n",
        );
        write_bgzf(
            &dir.path().join("pheno/008.5.gz"),
            "chrom\tpos\tref\talt\tgene\tpval\tbeta\n1\t200\tC\tG\tBRCA1\t0.2\t-1.5\n",
        );
        fs::write(
            dir.path().join("pheno/401"),
            "chrom\tpos\tref\talt\tgene\tpval\r\n1\t100\tA\tT\tBRCA1\t1e-8\r\n",
        )
        .unwrap();

        Fixture { dir }
    }

    fn request(&self, force: bool) -> BuildRequest {
        BuildRequest {
            canonical: self.dir.path().join("sites.tsv"),
            sources: self.dir.path().join("pheno").display().to_string(),
            output: self.dir.path().join("matrix.tsv.gz"),
            force,
        }
    }
}

#[test]
fn test_build_merges_all_input_encodings() {
    let fixture = Fixture::new();
    let request = fixture.request(false);

    let stats = match build_matrix(&request, &MatrixConfig::test()).unwrap() {
        BuildOutcome::Built(stats) => stats,
        BuildOutcome::UpToDate => panic!("fresh build reported up to date"),
    };

    assert_eq!(
        gunzip_file(&request.output),
        "#chrom\tpos\tref\talt\tgene\tpval@008.5\tbeta@008.5\tpval@250.2\tpval@401\n\
         1\t100\tA\tT\tBRCA1\t\t\t0.01\t1e-8\n\
         1\t200\tC\tG\tBRCA1\t0.2\t-1.5\t\t\n\
         2\t50\tG\tA\tTP53\t\t\t0.5\t\n"
    );
    assert_eq!(stats.rows, 3);
    assert_eq!(
        stats.matched,
        vec![
            ("008.5".to_string(), 1),
            ("250.2".to_string(), 2),
            ("401".to_string(), 1)
        ]
    );
}

#[test]
fn test_second_build_is_up_to_date() {
    let fixture = Fixture::new();
    let request = fixture.request(false);

    assert!(matches!(
        build_matrix(&request, &MatrixConfig::test()).unwrap(),
        BuildOutcome::Built(_)
    ));
    assert_eq!(
        build_matrix(&request, &MatrixConfig::test()).unwrap(),
        BuildOutcome::UpToDate
    );
}

#[test]
fn test_forced_rebuild_is_byte_identical() {
    let fixture = Fixture::new();
    let request = fixture.request(true);

    build_matrix(&request, &MatrixConfig::test()).unwrap();
    let first = fs::read(&request.output).unwrap();
    build_matrix(&request, &MatrixConfig::test()).unwrap();
    let second = fs::read(&request.output).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_new_source_triggers_rebuild() {
    let fixture = Fixture::new();
    let request = fixture.request(false);
    build_matrix(&request, &MatrixConfig::test()).unwrap();

    fs::write(
        fixture.dir.path().join("pheno/714.1"),
        "chrom\tpos\tref\talt\tgene\tpval\n2\t50\tG\tA\tTP53\t0.03\n",
    )
    .unwrap();

    let outcome = build_matrix(&request, &MatrixConfig::test()).unwrap();
    assert!(matches!(outcome, BuildOutcome::Built(_)));
    assert!(gunzip_file(&request.output)
        .lines()
        .next()
        .unwrap()
        .ends_with("pval@714.1"));
}

#[test]
fn test_failed_rebuild_keeps_previous_output() {
    let fixture = Fixture::new();
    let request = fixture.request(true);
    build_matrix(&request, &MatrixConfig::test()).unwrap();
    let before = fs::read(&request.output).unwrap();

    fs::write(
        fixture.dir.path().join("pheno/999"),
        "chrom\tpos\tref\talt\tgene\tpval\n1\t100\tA\tT\tBRCA2\t0.4\n",
    )
    .unwrap();

    let err = build_matrix(&request, &MatrixConfig::test()).unwrap_err();
    assert!(matches!(err, MatrixError::Alignment { ref source_id, .. } if source_id == "999"));
    assert_eq!(fs::read(&request.output).unwrap(), before);
}

#[test]
fn test_changed_output_settings_trigger_rebuild() {
    let fixture = Fixture::new();
    let request = fixture.request(false);
    build_matrix(&request, &MatrixConfig::test()).unwrap();

    let mut config = MatrixConfig::test();
    config.output.comment_header = false;
    config.output.missing_value = "NA".to_string();

    let outcome = build_matrix(&request, &config).unwrap();
    assert!(matches!(outcome, BuildOutcome::Built(_)));
    let text = gunzip_file(&request.output);
    assert!(text.starts_with("chrom\t"));
    assert!(text.contains("\t200\tC\tG\tBRCA1\t0.2\t-1.5\tNA\tNA\n"));

    assert_eq!(build_matrix(&request, &config).unwrap(), BuildOutcome::UpToDate);
    assert!(matches!(
        build_matrix(&request, &MatrixConfig::test()).unwrap(),
        BuildOutcome::Built(_)
    ));
    assert!(gunzip_file(&request.output).starts_with("#chrom\t"));
}

#[test]
fn test_canonical_column_with_separator_is_rejected() {
    let fixture = Fixture::new();
    fs::write(
        fixture.dir.path().join("sites.tsv"),
        "chrom\tpos\tref\talt\taf@gnomad\n1\t100\tA\tT\t0.1\n",
    )
    .unwrap();

    let request = fixture.request(false);
    let err = build_matrix(&request, &MatrixConfig::test()).unwrap_err();
    assert!(matches!(err, MatrixError::Schema { .. }));
    assert!(!request.output.exists());
}

/// Canonical stream of `n` distinct variants in order
fn canonical_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("{}\t{}\tA\tG\tgene{}", 1 + i / 1000, 100 + i, i % 7))
        .collect()
}

#[test]
fn test_random_subsequences_multi_seed() {
    for seed in 0..20u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let variants = canonical_lines(rng.gen_range(0..400));
        let source_count = rng.gen_range(1..6);

        let mut canonical = String::from("chrom\tpos\tref\talt\tgene\n");
        for line in &variants {
            canonical.push_str(line);
            canonical.push('\n');
        }

        // expected[source][row] = values, when the source has that row
        let mut expected: Vec<Vec<Option<Vec<String>>>> = Vec::new();
        let mut inputs = Vec::new();
        for s in 0..source_count {
            let width = rng.gen_range(0..4);
            let density: f64 = rng.gen();

            let mut text = String::from("chrom\tpos\tref\talt\tgene");
            for f in 0..width {
                text.push_str(&format!("\tf{}", f));
            }
            text.push('\n');

            let mut rows = Vec::new();
            for (row, line) in variants.iter().enumerate() {
                if rng.gen_bool(density) {
                    let values: Vec<String> =
                        (0..width).map(|f| format!("s{}r{}f{}", s, row, f)).collect();
                    text.push_str(line);
                    for v in &values {
                        text.push('\t');
                        text.push_str(v);
                    }
                    text.push('\n');
                    rows.push(Some(values));
                } else {
                    rows.push(None);
                }
            }
            expected.push(rows);
            inputs.push((format!("src{}", s), width, text));
        }

        let engine = MergeEngine::open(
            SourceInput::new("sites", TextLineSource::new(canonical.as_bytes()).unwrap()),
            inputs
                .iter()
                .map(|(id, _, text)| {
                    SourceInput::new(id.as_str(), TextLineSource::new(text.as_bytes()).unwrap())
                })
                .collect(),
            &MatrixConfig::test(),
        )
        .unwrap();
        let outcome = engine.merge_into(Vec::new()).unwrap();

        let mut output = String::new();
        MultiGzDecoder::new(outcome.sink.as_slice())
            .read_to_string(&mut output)
            .unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), variants.len() + 1, "seed {}", seed);

        for (row, line) in lines[1..].iter().enumerate() {
            let mut want = variants[row].clone();
            for (s, (_, width, _)) in inputs.iter().enumerate() {
                match &expected[s][row] {
                    Some(values) => {
                        for v in values {
                            want.push('\t');
                            want.push_str(v);
                        }
                    }
                    None => want.push_str(&"\t".repeat(*width)),
                }
            }
            assert_eq!(*line, want, "seed {} row {}", seed, row);
        }

        assert_eq!(outcome.stats.rows, variants.len() as u64, "seed {}", seed);
    }
}
