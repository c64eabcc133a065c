//! Pollard-rho (Brent variant) factorization of the handshake's `pq`, and
//! generation of fresh `pq` values for the server side.

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn modpow(mut n: u128, mut e: u128, m: u128) -> u128 {
    if m == 1 {
        return 0;
    }
    let mut result = 1;
    n %= m;
    while e > 0 {
        if e & 1 == 1 {
            result = result * n % m;
        }
        e >>= 1;
        n = n * n % m;
    }
    result
}

fn abs_sub(a: u128, b: u128) -> u128 {
    a.max(b) - a.min(b)
}

fn factorize_with(pq: u128, c: u128) -> (u64, u64) {
    if pq % 2 == 0 {
        return (2, (pq / 2) as u64);
    }

    let mut y = 3 * (pq / 7);
    let m = 7 * (pq / 13);
    let mut g = 1u128;
    let mut r = 1u128;
    let mut q = 1u128;
    let mut x = 0u128;
    let mut ys = 0u128;

    while g == 1 {
        x = y;
        for _ in 0..r {
            y = (modpow(y, 2, pq) + c) % pq;
        }
        let mut k = 0;
        while k < r && g == 1 {
            ys = y;
            for _ in 0..m.min(r - k) {
                y = (modpow(y, 2, pq) + c) % pq;
                q = q * abs_sub(x, y) % pq;
            }
            g = gcd(q, pq);
            k += m;
        }
        r *= 2;
    }

    if g == pq {
        loop {
            ys = (modpow(ys, 2, pq) + c) % pq;
            g = gcd(abs_sub(x, ys), pq);
            if g > 1 {
                break;
            }
        }
    }

    let p = g as u64;
    let q = (pq / g) as u64;
    (p.min(q), p.max(q))
}

/// Splits `pq` into `(p, q)` with `p <= q`, or `None` if no non-trivial
/// factor was found (primes, tiny inputs).
pub fn factorize(pq: u64) -> Option<(u64, u64)> {
    if pq < 4 || is_prime(pq) {
        return None;
    }
    let n = pq as u128;
    for attempt in [43u128, 47, 53, 59, 61] {
        let c = attempt * (n / 103);
        let (p, q) = factorize_with(n, c);
        if p != 1 && p != pq {
            return Some((p, q));
        }
    }
    None
}

/// Deterministic Miller-Rabin for the whole `u64` range.
pub fn is_prime(n: u64) -> bool {
    const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for p in BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let n = n as u128;
    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in BASES {
        let mut x = modpow(a as u128, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = x * x % n;
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Two distinct random 31-bit primes `p < q`, for a server's `resPQ`.
pub fn generate_pq() -> (u64, u64) {
    let p = random_prime();
    loop {
        let q = random_prime();
        if q != p {
            return (p.min(q), p.max(q));
        }
    }
}

fn random_prime() -> u64 {
    loop {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf).expect("getrandom failed");
        let candidate = (u32::from_le_bytes(buf) as u64 & 0x7fff_ffff) | 0x4000_0001;
        if is_prime(candidate) {
            return candidate;
        }
    }
}
