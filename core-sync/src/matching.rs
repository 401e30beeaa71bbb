//! # Track Matching
//!
//! Source and destination services use unrelated track IDs, so tracks are
//! paired up by a [`MatchPolicy`] over normalised titles (and, for
//! `TrackId`, IDs first with a title plus artist fallback). The policy is a
//! heuristic: covers and remixes with the same base title will pair up.
//!
//! Normalisation lowercases, drops bracketed qualifiers such as
//! "(Official Video)" or "[Remastered]", drops a trailing `feat.` credit and
//! collapses punctuation into single spaces:
//!
//! ```
//! use core_sync::matching::normalize_title;
//!
//! assert_eq!(normalize_title("Hello (Official Video)"), "hello");
//! assert_eq!(normalize_title("Adele - Hello [HD]"), "adele hello");
//! assert_eq!(normalize_title("Stay feat. Justin Bieber"), "stay");
//! ```

use bridge_traits::playlist::PlaylistTrack;
use core_runtime::MatchPolicy;

const FEATURE_MARKERS: [&str; 4] = [" feat. ", " feat ", " ft. ", " featuring "];

pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();

    let mut unbracketed = String::with_capacity(lowered.len());
    let mut depth = 0usize;
    for c in lowered.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => unbracketed.push(c),
            _ => {}
        }
    }

    // Padding lets a marker match at the very end of the title.
    let padded = format!("{} ", unbracketed);
    let credited = FEATURE_MARKERS
        .iter()
        .filter_map(|marker| padded.find(marker))
        .min()
        .map_or(padded.as_str(), |cut| &padded[..cut]);

    credited
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of comparing two playlists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackDiff {
    /// Source tracks with no counterpart on the destination
    pub to_add: Vec<PlaylistTrack>,
    /// Destination tracks with no counterpart on the source
    pub to_remove: Vec<PlaylistTrack>,
}

impl TrackDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

struct Candidate<'a> {
    track: &'a PlaylistTrack,
    title: String,
    /// Artist names lowercased with everything but letters and digits removed
    artists: Vec<String>,
}

impl<'a> Candidate<'a> {
    fn new(track: &'a PlaylistTrack) -> Self {
        Self {
            track,
            title: normalize_title(&track.title),
            artists: track
                .artists
                .iter()
                .map(|artist| compact(artist))
                .filter(|artist| !artist.is_empty())
                .collect(),
        }
    }

    fn same_title(&self, destination: &Candidate<'_>) -> bool {
        if self.title.is_empty() {
            // All qualifiers: only the same raw title will do.
            return self.track.title.eq_ignore_ascii_case(&destination.track.title);
        }
        self.title == destination.title
    }

    fn title_within(&self, destination: &Candidate<'_>) -> bool {
        !self.title.is_empty()
            && format!(" {} ", destination.title).contains(&format!(" {} ", self.title))
    }

    /// Unknown artists on either side agree with anything. Otherwise one
    /// source artist must appear in a destination artist or title, which
    /// covers channel names like "AdeleVEVO".
    fn artist_agrees(&self, destination: &Candidate<'_>) -> bool {
        if self.artists.is_empty() || destination.artists.is_empty() {
            return true;
        }
        let title = compact(&destination.track.title);
        self.artists.iter().any(|artist| {
            title.contains(artist.as_str())
                || destination
                    .artists
                    .iter()
                    .any(|other| other.contains(artist.as_str()) || artist.contains(other.as_str()))
        })
    }
}

fn compact(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

type Rule = fn(&Candidate<'_>, &Candidate<'_>) -> bool;

fn same_id(source: &Candidate<'_>, destination: &Candidate<'_>) -> bool {
    source.track.id == destination.track.id
}

fn same_title(source: &Candidate<'_>, destination: &Candidate<'_>) -> bool {
    source.same_title(destination)
}

fn same_title_and_artist(source: &Candidate<'_>, destination: &Candidate<'_>) -> bool {
    source.same_title(destination) && source.artist_agrees(destination)
}

fn title_within(source: &Candidate<'_>, destination: &Candidate<'_>) -> bool {
    source.title_within(destination)
}

/// Pairing rules tried in order; a later rule only sees tracks left
/// unpaired by the earlier ones, so looser rules never steal an exact pair.
fn rules(policy: MatchPolicy) -> &'static [Rule] {
    const TRACK_ID: &[Rule] = &[same_id, same_title_and_artist];
    const TITLE: &[Rule] = &[same_title];
    const TITLE_CONTAINS: &[Rule] = &[same_title, title_within];

    match policy {
        MatchPolicy::TrackId => TRACK_ID,
        MatchPolicy::Title => TITLE,
        MatchPolicy::TitleContains => TITLE_CONTAINS,
    }
}

/// Pair source and destination tracks one-to-one.
///
/// Each rule of the policy runs over the still-unpaired tracks, greedily in
/// source order. A destination track is consumed by the first source track
/// it matches, so a track listed twice on the source needs two copies on the
/// destination.
pub fn diff_tracks(
    source: &[PlaylistTrack],
    destination: &[PlaylistTrack],
    policy: MatchPolicy,
) -> TrackDiff {
    let source: Vec<Candidate<'_>> = source.iter().map(Candidate::new).collect();
    let destination: Vec<Candidate<'_>> = destination.iter().map(Candidate::new).collect();
    let mut paired_source = vec![false; source.len()];
    let mut paired_destination = vec![false; destination.len()];

    for rule in rules(policy) {
        for (i, candidate) in source.iter().enumerate() {
            if paired_source[i] {
                continue;
            }
            let pair = destination
                .iter()
                .enumerate()
                .position(|(j, other)| !paired_destination[j] && rule(candidate, other));
            if let Some(j) = pair {
                paired_source[i] = true;
                paired_destination[j] = true;
            }
        }
    }

    TrackDiff {
        to_add: unpaired(&source, &paired_source),
        to_remove: unpaired(&destination, &paired_destination),
    }
}

fn unpaired(candidates: &[Candidate<'_>], paired: &[bool]) -> Vec<PlaylistTrack> {
    candidates
        .iter()
        .zip(paired)
        .filter(|(_, paired)| !**paired)
        .map(|(candidate, _)| candidate.track.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, title: &str) -> PlaylistTrack {
        PlaylistTrack {
            id: id.to_string(),
            entry_id: None,
            title: title.to_string(),
            artists: Vec::new(),
            duration_ms: None,
        }
    }

    fn ids(tracks: &[PlaylistTrack]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_normalize_strips_qualifiers() {
        assert_eq!(normalize_title("  Don't Stop Me Now!  "), "don t stop me now");
        assert_eq!(normalize_title("Song (Live) [2011 Remaster]"), "song");
        assert_eq!(normalize_title("Song ft. Someone"), "song");
        assert_eq!(normalize_title("Feat"), "feat");
        assert_eq!(normalize_title("Café Del Mar"), "café del mar");
    }

    #[test]
    fn test_missing_track_is_added() {
        let source = vec![track("s1", "A"), track("s2", "B"), track("s3", "C")];
        let destination = vec![track("d1", "A"), track("d2", "B")];

        let diff = diff_tracks(&source, &destination, MatchPolicy::Title);

        assert_eq!(ids(&diff.to_add), vec!["s3"]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_extra_destination_track_is_removed() {
        let source = vec![track("s1", "A")];
        let destination = vec![track("d1", "A (Official Video)"), track("d2", "Z")];

        let diff = diff_tracks(&source, &destination, MatchPolicy::Title);

        assert!(diff.to_add.is_empty());
        assert_eq!(ids(&diff.to_remove), vec!["d2"]);
    }

    #[test]
    fn test_title_contains_accepts_uploader_prefix() {
        let source = vec![track("s1", "Hello")];
        let destination = vec![track("d1", "Adele - Hello (Official Music Video)")];

        assert!(diff_tracks(&source, &destination, MatchPolicy::TitleContains).is_empty());

        let diff = diff_tracks(&source, &destination, MatchPolicy::Title);
        assert_eq!(ids(&diff.to_add), vec!["s1"]);
    }

    #[test]
    fn test_title_contains_matches_whole_words_only() {
        let source = vec![track("s1", "Run")];
        let destination = vec![track("d1", "Runaway")];

        let diff = diff_tracks(&source, &destination, MatchPolicy::TitleContains);
        assert_eq!(ids(&diff.to_add), vec!["s1"]);
        assert_eq!(ids(&diff.to_remove), vec!["d1"]);
    }

    #[test]
    fn test_matching_is_one_to_one() {
        let source = vec![track("s1", "Intro"), track("s2", "Intro")];
        let destination = vec![track("d1", "Intro")];

        let diff = diff_tracks(&source, &destination, MatchPolicy::Title);
        assert_eq!(ids(&diff.to_add), vec!["s2"]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_exact_title_wins_over_containment() {
        let source = vec![track("s1", "Hello"), track("s2", "Hello Goodbye")];
        let destination = vec![track("d1", "Hello Goodbye"), track("d2", "Hello")];

        assert!(diff_tracks(&source, &destination, MatchPolicy::TitleContains).is_empty());
    }

    #[test]
    fn test_track_id_policy_prefers_ids() {
        let source = vec![track("x", "Intro"), track("y", "Intro")];
        let destination = vec![track("z", "Intro"), track("y", "Intro (Live)")];

        let diff = diff_tracks(&source, &destination, MatchPolicy::TrackId);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_track_id_policy_falls_back_to_title_and_artist() {
        let mut source = track("spotify-a", "Hello");
        source.artists = vec!["Adele".to_string()];
        let mut same = track("video-a", "Hello (Official Music Video)");
        same.artists = vec!["AdeleVEVO".to_string()];
        let mut cover = track("video-b", "Hello");
        cover.artists = vec!["Lionel Richie".to_string()];

        let diff = diff_tracks(&[source.clone()], &[same], MatchPolicy::TrackId);
        assert!(diff.is_empty());

        let diff = diff_tracks(&[source], &[cover], MatchPolicy::TrackId);
        assert_eq!(ids(&diff.to_add), vec!["spotify-a"]);
        assert_eq!(ids(&diff.to_remove), vec!["video-b"]);
    }
}
