//! Density-based clustering over embedding distances.
//!
//! Distances are cosine distances (`1 - similarity`). Two points are
//! neighbors when their distance is at most `eps`; a point whose
//! neighborhood (itself included) holds at least `min_samples` points is a
//! core point. Clusters grow from core points; points reachable from no core
//! point are noise.

use std::collections::VecDeque;

use news_embeddings::Embedding;

use crate::error::TopicsError;

/// Result of one clustering pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clustering {
    /// Member indices per cluster, each sorted ascending. Clusters are
    /// ordered by their lowest core point.
    pub clusters: Vec<Vec<usize>>,
    /// Indices that belong to no cluster
    pub noise: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Label {
    Noise,
    Cluster(usize),
}

/// Symmetric distance matrix where distance = 1 - cosine similarity.
pub fn pairwise_distances(embeddings: &[Embedding]) -> Vec<Vec<f32>> {
    let n = embeddings.len();
    let mut distances = vec![vec![0.0f32; n]; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let dist = 1.0 - embeddings[i].cosine_similarity(&embeddings[j]);
            distances[i][j] = dist;
            distances[j][i] = dist;
        }
    }

    distances
}

fn region(distances: &[Vec<f32>], point: usize, eps: f32) -> Vec<usize> {
    distances[point]
        .iter()
        .enumerate()
        .filter(|(_, d)| **d <= eps)
        .map(|(i, _)| i)
        .collect()
}

/// Run DBSCAN over a precomputed distance matrix.
///
/// Deterministic: points are visited in index order, so identical input
/// always yields identical clusters.
pub fn dbscan(distances: &[Vec<f32>], eps: f32, min_samples: usize) -> Result<Clustering, TopicsError> {
    let n = distances.len();
    if let Some(row) = distances.iter().position(|r| r.len() != n) {
        return Err(TopicsError::Clustering(format!(
            "distance row {} has {} entries, expected {}",
            row,
            distances[row].len(),
            n
        )));
    }
    if min_samples == 0 {
        return Err(TopicsError::Clustering("min_samples must be >= 1".to_string()));
    }

    let mut labels: Vec<Option<Label>> = vec![None; n];
    let mut cluster_count = 0;

    for point in 0..n {
        if labels[point].is_some() {
            continue;
        }

        let neighbors = region(distances, point, eps);
        if neighbors.len() < min_samples {
            labels[point] = Some(Label::Noise);
            continue;
        }

        let cluster = cluster_count;
        cluster_count += 1;
        labels[point] = Some(Label::Cluster(cluster));

        let mut queue: VecDeque<usize> = neighbors.into_iter().collect();
        while let Some(next) = queue.pop_front() {
            match labels[next] {
                Some(Label::Cluster(_)) => continue,
                // Border point: reachable, but does not expand
                Some(Label::Noise) => labels[next] = Some(Label::Cluster(cluster)),
                None => {
                    labels[next] = Some(Label::Cluster(cluster));
                    let reach = region(distances, next, eps);
                    if reach.len() >= min_samples {
                        queue.extend(reach);
                    }
                }
            }
        }
    }

    let mut result = Clustering {
        clusters: vec![Vec::new(); cluster_count],
        noise: Vec::new(),
    };
    for (point, label) in labels.into_iter().enumerate() {
        match label {
            Some(Label::Cluster(c)) => result.clusters[c].push(point),
            _ => result.noise.push(point),
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_pairwise_distances_symmetric() {
        let embeddings = vec![unit(&[1.0, 0.0]), unit(&[0.0, 1.0]), unit(&[1.0, 0.0])];
        let d = pairwise_distances(&embeddings);
        assert!((d[0][1] - 1.0).abs() < 1e-6);
        assert!((d[1][0] - 1.0).abs() < 1e-6);
        assert!(d[0][2].abs() < 1e-6);
        assert_eq!(d[1][1], 0.0);
    }

    #[test]
    fn test_two_clusters_and_noise() {
        let embeddings = vec![
            unit(&[1.0, 0.0, 0.0]),
            unit(&[0.0, 1.0, 0.0]),
            unit(&[0.95, 0.05, 0.0]),
            unit(&[0.05, 0.95, 0.0]),
            unit(&[0.0, 0.0, 1.0]),
        ];
        let result = dbscan(&pairwise_distances(&embeddings), 0.1, 2).unwrap();
        assert_eq!(result.clusters, vec![vec![0, 2], vec![1, 3]]);
        assert_eq!(result.noise, vec![4]);
    }

    #[test]
    fn test_min_samples_counts_the_point_itself() {
        let embeddings = vec![unit(&[1.0, 0.0]), unit(&[0.0, 1.0])];
        let d = pairwise_distances(&embeddings);

        let singles = dbscan(&d, 0.1, 1).unwrap();
        assert_eq!(singles.clusters, vec![vec![0], vec![1]]);

        let pairs = dbscan(&d, 0.1, 2).unwrap();
        assert!(pairs.clusters.is_empty());
        assert_eq!(pairs.noise, vec![0, 1]);
    }

    #[test]
    fn test_chain_expands_through_core_points() {
        // 0-1 and 1-2 are within eps, 0-2 is not
        let d = vec![
            vec![0.0, 0.2, 0.5],
            vec![0.2, 0.0, 0.2],
            vec![0.5, 0.2, 0.0],
        ];
        let result = dbscan(&d, 0.3, 2).unwrap();
        assert_eq!(result.clusters, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_border_point_joins_but_does_not_expand() {
        // 0 is core with neighbors {0,1,2}; 2 is border (neighbors {0,2,3}
        // with min_samples 4 is too few); 3 only reaches 2
        let d = vec![
            vec![0.0, 0.1, 0.1, 0.9, 0.1],
            vec![0.1, 0.0, 0.9, 0.9, 0.1],
            vec![0.1, 0.9, 0.0, 0.1, 0.9],
            vec![0.9, 0.9, 0.1, 0.0, 0.9],
            vec![0.1, 0.1, 0.9, 0.9, 0.0],
        ];
        let result = dbscan(&d, 0.2, 4).unwrap();
        assert_eq!(result.clusters, vec![vec![0, 1, 2, 4]]);
        assert_eq!(result.noise, vec![3]);
    }

    #[test]
    fn test_empty_input() {
        let result = dbscan(&[], 0.3, 2).unwrap();
        assert!(result.clusters.is_empty());
        assert!(result.noise.is_empty());
    }

    #[test]
    fn test_ragged_matrix_rejected() {
        let d = vec![vec![0.0, 0.1], vec![0.1]];
        assert!(dbscan(&d, 0.3, 2).is_err());
    }
}
