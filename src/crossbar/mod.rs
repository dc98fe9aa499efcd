/* Copyright (C) 2022 Antmicro
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

/// Assigns `c` of `n` channel tracks to each of the `m` bits of a port.
///
/// Returns `(track, bit)` pairs, ordered by bit and then by track.
///
/// # Arguments
/// * `n` - number of tracks
/// * `m` - number of port bits
/// * `c` - tracks per bit
/// * `n_selected` - per-track usage counters, shared by every call that
///   allocates from the same set of tracks. Must hold at least `n` entries.
///
/// Each bit takes an evenly spaced pattern of tracks, choosing among the
/// possible starting offsets the one hitting the most unused tracks. Used
/// tracks still left in the pattern are then swapped for the nearest unused
/// ones, so usage never drifts apart by more than one. Once every track has
/// been used, all counters are lowered by one, which keeps later ports from
/// repeating the same subset.
pub fn crossbar(n: usize, m: usize, c: usize, n_selected: &mut [u32]) -> Vec<(usize, usize)> {
    if c == 0 || n == 0 {
        return Vec::new();
    }
    if c >= n {
        return (0 .. m)
            .flat_map(|bit| (0 .. n).map(move |track| (track, bit)))
            .collect();
    }

    let step = n as f64 / c as f64;
    let candidates = step.ceil() as usize;
    let mut pairs = Vec::with_capacity(m * c);

    for bit in 0 .. m {
        /* Pick the starting offset covering the most unused tracks */
        let mut best: Option<(usize, Vec<usize>)> = None;
        for offset in 0 .. candidates {
            let pattern = spaced_pattern(n, c, step, offset);
            let unused = pattern.iter().filter(|t| n_selected[**t] == 0).count();
            if best.as_ref().map_or(true, |(b, _)| unused > *b) {
                best = Some((unused, pattern));
            }
        }
        let mut tracks = match best {
            Some((_, pattern)) => pattern,
            None => continue,
        };

        /* Swap used tracks for the closest unused ones further along the channel */
        let mut taken = vec![false; n];
        for t in &tracks {
            taken[*t] = true;
        }
        for slot in 0 .. tracks.len() {
            let track = tracks[slot];
            if n_selected[track] == 0 {
                continue;
            }
            let replacement = (1 .. n)
                .map(|d| (track + d) % n)
                .find(|t| !taken[*t] && n_selected[*t] == 0);
            if let Some(replacement) = replacement {
                taken[track] = false;
                taken[replacement] = true;
                tracks[slot] = replacement;
            }
        }

        tracks.sort_unstable();
        for track in tracks {
            n_selected[track] += 1;
            pairs.push((track, bit));
        }

        if n_selected[.. n].iter().all(|cnt| *cnt > 0) {
            for cnt in n_selected[.. n].iter_mut() {
                *cnt -= 1;
            }
        }
    }

    pairs
}

/* `c` tracks spaced by `step`, starting at `offset`. Spacing is at least 1,
 * so the tracks are pairwise distinct. */
fn spaced_pattern(n: usize, c: usize, step: f64, offset: usize) -> Vec<usize> {
    (0 .. c)
        .map(|j| ((offset as f64 + j as f64 * step).floor() as usize) % n)
        .collect()
}
