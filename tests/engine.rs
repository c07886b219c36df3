//! End-to-end scenarios over a file-backed engine: the text log is
//! written and replayed for real, the snapshot path is taken across
//! restarts, and query results are checked down to their ordering.

use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::tempdir;

use lexitree::distance::damerau_levenshtein;
use lexitree::engine::{AddOutcome, Engine};
use lexitree::query::{Query, QueryOptions};

fn ids(engine: &Engine, query: Query) -> Vec<u32> {
    engine
        .query(&query, &QueryOptions::default())
        .unwrap()
        .ids()
}

/// Push a file's mtime into the past so a later write to a sibling
/// is strictly newer, whatever the filesystem's clock granularity.
fn backdate(path: &Path) {
    let old = SystemTime::now() - Duration::from_secs(60);
    File::options()
        .append(true)
        .open(path)
        .unwrap()
        .set_modified(old)
        .unwrap();
}

#[test]
fn similarity_prefix_and_suffix() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");
    let mut engine = Engine::open(&path).unwrap();

    for word in ["apple", "aple", "applet", "banana"] {
        engine.add(word.as_bytes()).unwrap();
    }

    let similar = engine
        .query(
            &Query::Similarity {
                word: b"apple".to_vec(),
                max_distance: Some(2),
                exhaustive: false,
            },
            &QueryOptions::default(),
        )
        .unwrap();

    let pairs: Vec<(u32, usize)> = similar
        .matches
        .iter()
        .map(|hit| (hit.id, hit.distance))
        .collect();
    assert_eq!(vec![(0, 0), (1, 1), (2, 1)], pairs);

    assert_eq!(vec![0], ids(&engine, Query::Exact(b"apple".to_vec())));
    assert_eq!(vec![0, 2], ids(&engine, Query::Prefix(b"app".to_vec())));
    assert_eq!(vec![2], ids(&engine, Query::Suffix(b"let".to_vec())));
}

#[test]
fn substring_length_and_complex() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");
    let mut engine = Engine::open(&path).unwrap();

    for word in ["cat", "car", "cart"] {
        engine.add(word.as_bytes()).unwrap();
    }

    assert_eq!(vec![0, 1, 2], ids(&engine, Query::Substring(b"ca".to_vec())));
    assert_eq!(vec![0, 1], ids(&engine, Query::Length(3)));
    assert_eq!(
        vec![0, 2],
        ids(
            &engine,
            Query::Complex(vec!["pre:c".into(), "suf:t".into(), "len:3-4".into()])
        )
    );
}

#[test]
fn delete_list_undelete() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");
    let mut engine = Engine::open(&path).unwrap();

    engine.add(b"apple").unwrap();
    engine.delete(0).unwrap();

    assert!(ids(&engine, Query::Exact(b"apple".to_vec())).is_empty());

    // The full listing still shows the record, flagged.
    let all = engine.list(true);
    assert_eq!(1, all.len());
    assert_eq!(0, all[0].id);
    assert!(all[0].deleted);

    // And the plain listing does not.
    assert!(engine.list(false).is_empty());

    engine.undelete(0).unwrap();
    assert_eq!(vec![0], ids(&engine, Query::Exact(b"apple".to_vec())));
}

#[test]
fn mutations_survive_a_restart() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");

    {
        let mut engine = Engine::open(&path).unwrap();
        for word in ["apple", "banana", "cherry"] {
            engine.add(word.as_bytes()).unwrap();
        }
        engine.delete(1).unwrap();
        engine.shutdown().unwrap();
    }

    let mut engine = Engine::open(&path).unwrap();
    assert_eq!(3, engine.len());
    assert_eq!(2, engine.active_len());
    assert_eq!(vec![0], ids(&engine, Query::Prefix(b"app".to_vec())));
    assert!(ids(&engine, Query::Exact(b"banana".to_vec())).is_empty());

    // The deleted record still restores after the restart.
    assert!(engine.undelete(1).unwrap());
    assert_eq!(vec![1], ids(&engine, Query::Exact(b"banana".to_vec())));
}

#[test]
fn snapshot_path_is_taken_and_answers_match() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");

    lexitree::generate::generate_seeded(&path, 2000, 99).unwrap();
    backdate(&path);

    let (prefix_before, substring_before, similar_before);
    {
        let engine = Engine::open(&path).unwrap();
        prefix_before = ids(&engine, Query::Prefix(b"ab".to_vec()));
        substring_before = ids(&engine, Query::Substring(b"qu".to_vec()));
        similar_before = ids(
            &engine,
            Query::Similarity {
                word: b"abcdef".to_vec(),
                max_distance: Some(3),
                exhaustive: false,
            },
        );
        engine.shutdown().unwrap();
    }

    // The snapshot written at shutdown is newer than the log, so the
    // restart takes the fast path; answers must be identical.
    assert!(lexitree::snapshot::sibling_path(&path).exists());

    let engine = Engine::open(&path).unwrap();
    assert_eq!(prefix_before, ids(&engine, Query::Prefix(b"ab".to_vec())));
    assert_eq!(
        substring_before,
        ids(&engine, Query::Substring(b"qu".to_vec()))
    );
    assert_eq!(
        similar_before,
        ids(
            &engine,
            Query::Similarity {
                word: b"abcdef".to_vec(),
                max_distance: Some(3),
                exhaustive: false,
            }
        )
    );
    assert!(engine.validate().is_clean());
}

#[test]
fn stale_snapshot_falls_back_to_rebuild() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");

    {
        let mut engine = Engine::open(&path).unwrap();
        engine.add(b"before").unwrap();
        engine.shutdown().unwrap();
    }
    backdate(&lexitree::snapshot::sibling_path(&path));

    // Mutate the log after the snapshot: it is now stale.
    {
        let mut engine = Engine::open(&path).unwrap();
        engine.add(b"after").unwrap();
        // No shutdown: the stale snapshot stays on disk.
    }

    let engine = Engine::open(&path).unwrap();
    assert_eq!(vec![1], ids(&engine, Query::Exact(b"after".to_vec())));
    assert!(engine.validate().is_clean());
}

#[test]
fn exact_hit_leads_similarity_results() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");
    let mut engine = Engine::open(&path).unwrap();

    // Insertion order chosen so the exact match is deep in the tree.
    for word in ["maple", "ample", "apple"] {
        engine.add(word.as_bytes()).unwrap();
    }

    let result = engine
        .query(
            &Query::Similarity {
                word: b"apple".to_vec(),
                max_distance: Some(0),
                exhaustive: false,
            },
            &QueryOptions::default(),
        )
        .unwrap();

    assert_eq!(2, result.matches[0].id);
    assert_eq!(0, result.matches[0].distance);
}

#[test]
fn complex_not_as_sole_term() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");

    lexitree::generate::generate_seeded(&path, 1000, 7).unwrap();
    let engine = Engine::open(&path).unwrap();

    let not_x = ids(&engine, Query::Complex(vec!["not:x".into()]));

    let expected: Vec<u32> = engine
        .list(false)
        .iter()
        .filter(|record| !record.word.contains(&b'x'))
        .map(|record| record.id)
        .collect();

    assert_eq!(expected, not_x);
}

#[test]
fn substring_matches_naive_scan() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");

    lexitree::generate::generate_seeded(&path, 1000, 13).unwrap();
    let engine = Engine::open(&path).unwrap();

    for key in [&b"ab"[..], &b"the"[..], &b"zz"[..], &b"q"[..]] {
        let indexed = ids(&engine, Query::Substring(key.to_vec()));

        let naive: Vec<u32> = engine
            .list(false)
            .iter()
            .filter(|record| {
                record
                    .word
                    .windows(key.len())
                    .any(|window| window == key)
            })
            .map(|record| record.id)
            .collect();

        assert_eq!(naive, indexed, "divergence for key {:?}", key);
    }
}

#[test]
fn similarity_matches_naive_distance_scan() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");
    let mut engine = Engine::open(&path).unwrap();

    // One tight cluster of variants of a stem: pairwise distances
    // stay at or under 4, low enough that the bounded kernel's cap
    // cannot hide a subtree from either search mode, so both must
    // agree with the brute-force scan down to the reported distances.
    for word in [
        "abcdefgh", "abcdefg", "abcdefghi", "abcdefgx", "abdcefgh", "abcdefhg",
        "xbcdefgh", "abcdef", "abcdefghij", "aacdefgh", "badcefgh", "abcxxfgh",
    ] {
        engine.add(word.as_bytes()).unwrap();
    }
    // Deletion laziness must not leak through either mode.
    engine.delete(3).unwrap();

    for query in [&b"abcdefgh"[..], &b"abcdefg"[..], &b"abcd"[..]] {
        for radius in [1usize, 2] {
            for exhaustive in [false, true] {
                let result = engine
                    .query(
                        &Query::Similarity {
                            word: query.to_vec(),
                            max_distance: Some(radius),
                            exhaustive,
                        },
                        &QueryOptions::default(),
                    )
                    .unwrap();
                let found: Vec<(u32, usize)> = result
                    .matches
                    .iter()
                    .map(|hit| (hit.id, hit.distance))
                    .collect();

                let mut expected: Vec<(u32, usize)> = engine
                    .list(false)
                    .iter()
                    .filter_map(|record| {
                        let distance = damerau_levenshtein(query, &record.word, radius);
                        (distance <= radius).then_some((record.id, distance))
                    })
                    .collect();
                expected.sort_by_key(|&(id, distance)| (distance, id));

                assert_eq!(
                    expected,
                    found,
                    "divergence for query {:?}, radius {}, exhaustive {}",
                    String::from_utf8_lossy(query),
                    radius,
                    exhaustive
                );
            }
        }
    }
}

#[test]
fn add_after_restart_continues_ids() {
    let directory = tempdir().unwrap();
    let path = directory.path().join("words.txt");

    {
        let mut engine = Engine::open(&path).unwrap();
        engine.add(b"zero").unwrap();
        engine.add(b"one").unwrap();
    }

    let mut engine = Engine::open(&path).unwrap();
    assert_eq!(AddOutcome::Added(2), engine.add(b"two").unwrap());
}
