use anyhow::{Context, Result};
use encoding_rs::WINDOWS_1252;

use row_sieve::data::export;
use row_sieve::{CellValue, SourceFormat, Table};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

fn gene_id(i: usize) -> String {
    format!("GENE_{i:04}")
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);
    let n_genes = 100;

    // Template: 25 distinct genes plus one accented identifier.
    let mut keep: Vec<String> = (0..n_genes).step_by(4).map(gene_id).collect();
    keep.push("Gène_ß".to_string());
    let mut template = String::from("gene_id,panel\n");
    for id in &keep {
        template.push_str(&format!("{id},core\n"));
    }
    std::fs::write("sample_template.csv", &template).context("writing sample_template.csv")?;

    let samples = ["Müller", "Åsa", "Zoë"];

    // Target A: Latin-1 family encoding, semicolon-delimited.
    let mut target_a = String::from("gene_id;sample;tpm\n");
    for _ in 0..200 {
        let id = if rng.below(20) == 0 {
            "Gène_ß".to_string()
        } else {
            gene_id(rng.below(n_genes))
        };
        let sample = samples[rng.below(samples.len())];
        target_a.push_str(&format!("{id};{sample};{:.3}\n", rng.next_f64() * 1000.0));
    }
    let (latin, _, _) = WINDOWS_1252.encode(&target_a);
    std::fs::write("sample_target_a.csv", &latin).context("writing sample_target_a.csv")?;

    // Target B: a workbook sheet with typed cells.
    let rows: Vec<Vec<CellValue>> = (0..150)
        .map(|i| {
            vec![
                CellValue::Text(gene_id(rng.below(n_genes))),
                CellValue::Integer(i),
                CellValue::Float((rng.next_f64() * 100.0).round() / 10.0),
                CellValue::Bool(rng.below(2) == 0),
            ]
        })
        .collect();
    let table = Table::new(
        "sample_target_b.xlsx",
        vec![
            "gene_id".into(),
            "row".into(),
            "log2fc".into(),
            "significant".into(),
        ],
        rows,
        SourceFormat::Spreadsheet {
            sheet: "Expression".into(),
        },
    )?;
    let workbook = export::encode_table(&table)?;
    std::fs::write("sample_target_b.xlsx", workbook).context("writing sample_target_b.xlsx")?;

    println!(
        "Wrote sample_template.csv ({} keys), sample_target_a.csv (200 rows), sample_target_b.xlsx (150 rows)",
        keep.len()
    );
    Ok(())
}
