//! Hash vector generator and release gate.
//!
//! Produces `test-vectors/poseidon_bn254.json`, the single source of truth
//! for the Poseidon parameter set. In verify mode every vector in the file
//! is recomputed through the native hasher, the portable sponge and the
//! R1CS gadget; any disagreement fails the run, as does a generated vector
//! the file lacks.
//!
//! Usage:
//!   shroud-testvec [--file PATH]            # Generate the vector file
//!   shroud-testvec --verify [--file PATH]   # Verify an existing file

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::ConstraintSystem;
use hex_literal::hex;
use serde::{Deserialize, Serialize};
use shroud_crypto::field::{bytes_to_field, field_to_bytes, u64_to_field};
use shroud_crypto::{gadget, note, poseidon, sponge, Fr, HASH_PARAMETER_SET, HASH_VERSION};
use tracing::{error, info};

const DEFAULT_PATH: &str = "test-vectors/poseidon_bn254.json";

/// circomlib `poseidon([1, 2])`.
const CIRCOMLIB_2: [u8; 32] = hex!("115cc0f5e7d690413df64c6b9662e9cf2a3617f2743245519e19607a4417189a");

/// circomlib `poseidon([1, 2, 3, 4])`.
const CIRCOMLIB_4: [u8; 32] = hex!("299c867db6c1fdd79dcefa40e4510b9837e60ebb1ce0663dbaa525df65250465");

#[derive(Serialize, Deserialize)]
struct TestVectors {
    version: String,
    generated_by: String,
    hash_version: u32,
    parameter_set: String,
    vectors: BTreeMap<String, TestVector>,
}

#[derive(Serialize, Deserialize)]
struct TestVector {
    description: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

fn hex_field(fe: &Fr) -> String {
    hex::encode(field_to_bytes(fe))
}

fn vector(description: &str, inputs: &[Fr]) -> anyhow::Result<TestVector> {
    let output = poseidon::hash(inputs)?;
    Ok(TestVector {
        description: description.to_string(),
        inputs: inputs
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("in{i}"), hex_field(v)))
            .collect(),
        outputs: BTreeMap::from([("hash".to_string(), hex_field(&output))]),
    })
}

fn generate_reference_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let two = vector(
        "Poseidon(1, 2), width 3, circomlib reference",
        &[u64_to_field(1), u64_to_field(2)],
    )?;
    let four = vector(
        "Poseidon(1, 2, 3, 4), width 5, circomlib reference",
        &(1..=4).map(u64_to_field).collect::<Vec<_>>(),
    )?;

    // Refuse to write a file that disagrees with circomlib.
    for (name, v, reference) in [("2", &two, CIRCOMLIB_2), ("4", &four, CIRCOMLIB_4)] {
        if v.outputs.get("hash") != Some(&hex::encode(reference)) {
            bail!("native Poseidon({name} inputs) disagrees with the circomlib reference");
        }
    }

    vectors.insert("poseidon_2_inputs".to_string(), two);
    vectors.insert("poseidon_4_inputs".to_string(), four);
    Ok(vectors)
}

fn generate_protocol_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    vectors.insert(
        "poseidon_1_input".to_string(),
        vector("Poseidon(1), width 2", &[u64_to_field(1)])?,
    );
    vectors.insert(
        "poseidon_3_inputs".to_string(),
        vector("Poseidon(1, 2, 3), width 4", &[u64_to_field(1), u64_to_field(2), u64_to_field(3)])?,
    );

    // Note commitment for amount 10 with fixed secret and blinding.
    let secret = u64_to_field(0x5EC2E7);
    let blinding = u64_to_field(0xB11D);
    let commitment = note::derive_commitment(10, &secret, &blinding)?;
    vectors.insert(
        "note_commitment".to_string(),
        vector(
            "commitment = Poseidon(amount, secret, blinding)",
            &[u64_to_field(10), secret, blinding],
        )?,
    );
    vectors.insert(
        "note_nullifier".to_string(),
        vector(
            "nullifier = Poseidon(commitment, secret)",
            &[commitment, secret],
        )?,
    );

    // Empty-subtree chain: zeros[1] = Poseidon(0, 0).
    let zeros = poseidon::zero_hashes(1)?;
    vectors.insert(
        "merkle_empty_node".to_string(),
        vector("zeros[1] = Poseidon(0, 0)", &[zeros[0], zeros[0]])?,
    );

    Ok(vectors)
}

fn generate_all_vectors() -> anyhow::Result<TestVectors> {
    let mut all_vectors = generate_reference_vectors()?;
    all_vectors.extend(generate_protocol_vectors()?);

    Ok(TestVectors {
        version: "1".to_string(),
        generated_by: "shroud-testvec".to_string(),
        hash_version: HASH_VERSION,
        parameter_set: HASH_PARAMETER_SET.to_string(),
        vectors: all_vectors,
    })
}

fn decode(name: &str, value: &str) -> anyhow::Result<Fr> {
    let raw = hex::decode(value).with_context(|| format!("{name}: bad hex"))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| anyhow!("{name}: value is not 32 bytes"))?;
    Ok(bytes_to_field(&bytes)?)
}

fn gadget_hash(inputs: &[Fr]) -> anyhow::Result<Fr> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    let vars = inputs
        .iter()
        .map(|v| FpVar::new_witness(cs.clone(), || Ok(*v)))
        .collect::<Result<Vec<_>, _>>()?;
    let out = gadget::hash(&vars)?;
    if !cs.is_satisfied()? {
        bail!("gadget constraints unsatisfied");
    }
    Ok(out.value()?)
}

/// Recompute one vector through every implementation. Returns the names of
/// the implementations that disagree with the recorded output.
fn check_vector(name: &str, vector: &TestVector) -> anyhow::Result<Vec<&'static str>> {
    let inputs = vector
        .inputs
        .values()
        .map(|v| decode(name, v))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let expected = vector
        .outputs
        .get("hash")
        .ok_or_else(|| anyhow!("{name}: no hash output"))?;

    let results = [
        ("native", poseidon::hash(&inputs)?),
        ("sponge", sponge::hash(&inputs)?),
        ("gadget", gadget_hash(&inputs)?),
    ];
    Ok(results
        .into_iter()
        .filter(|(_, out)| &hex_field(out) != expected)
        .map(|(implementation, _)| implementation)
        .collect())
}

fn verify_vectors(vectors: &TestVectors) -> anyhow::Result<bool> {
    if vectors.hash_version != HASH_VERSION || vectors.parameter_set != HASH_PARAMETER_SET {
        error!(
            file_version = vectors.hash_version,
            file_parameters = %vectors.parameter_set,
            "vector file was generated for another parameter set"
        );
        return Ok(false);
    }

    let regenerated = generate_all_vectors()?;
    let mut all_pass = true;

    for (name, expected) in &vectors.vectors {
        let failing = check_vector(name, expected)?;
        if !failing.is_empty() {
            error!(vector = %name, implementations = ?failing, "FAIL");
            all_pass = false;
            continue;
        }
        match regenerated.vectors.get(name) {
            Some(actual) if actual.inputs != expected.inputs || actual.outputs != expected.outputs => {
                error!(vector = %name, "FAIL: differs from regenerated vector");
                all_pass = false;
            }
            _ => info!(vector = %name, "PASS"),
        }
    }

    for name in missing_vectors(&regenerated, vectors) {
        error!(vector = %name, "FAIL: missing from vector file");
        all_pass = false;
    }

    Ok(all_pass)
}

/// Names the generator produces that the file does not carry.
fn missing_vectors<'a>(regenerated: &'a TestVectors, file: &TestVectors) -> Vec<&'a str> {
    regenerated
        .vectors
        .keys()
        .filter(|name| !file.vectors.contains_key(*name))
        .map(String::as_str)
        .collect()
}

struct Args {
    verify: bool,
    path: PathBuf,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        verify: false,
        path: PathBuf::from(DEFAULT_PATH),
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--verify" => args.verify = true,
            "--file" => {
                args.path = iter
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("--file needs a path"))?;
            }
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shroud=info".parse()?),
        )
        .init();

    let args = parse_args()?;
    let path = &args.path;

    if args.verify {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let vectors: TestVectors = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        if !verify_vectors(&vectors)? {
            bail!("test vector verification failed");
        }
        info!(count = vectors.vectors.len(), "all test vectors verified");
        return Ok(());
    }

    let vectors = generate_all_vectors()?;
    if !verify_vectors(&vectors)? {
        bail!("self-verification failed");
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&vectors)?;
    std::fs::write(path, json + "\n").with_context(|| format!("writing {}", path.display()))?;
    info!(count = vectors.vectors.len(), path = %path.display(), "generated test vectors");
    Ok(())
}
