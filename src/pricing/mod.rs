//! Black–Scholes pricing kernel: price, greeks, and implied volatility.
//!
//! All prices are USD; volatility is annualized and expressed as a decimal
//! (0.8 = 80%). Crypto options trade around the clock, so the day count is
//! a flat 365.

use crate::model::{Greeks, OptionType};

/// Annualized risk-free rate used across the engine.
pub const RISK_FREE_RATE: f64 = 0.05;
/// Crypto markets are 24/7.
pub const DAYS_PER_YEAR: f64 = 365.0;

const IV_LOW: f64 = 0.01;
const IV_HIGH: f64 = 10.0;
const IV_TOL: f64 = 1e-6;
const IV_MAX_ITER: usize = 100;

/// Standard normal CDF via the Abramowitz–Stegun erf approximation.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Error function, Abramowitz–Stegun 7.1.26 (|error| < 1.5e-7).
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

fn d1_d2(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> (f64, f64) {
    let sqrt_t = t.sqrt();
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * sqrt_t);
    (d1, d1 - sigma * sqrt_t)
}

fn intrinsic(s: f64, k: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => (s - k).max(0.0),
        OptionType::Put => (k - s).max(0.0),
    }
}

/// Black–Scholes option price in USD.
///
/// `s`: spot, `k`: strike, `t`: time to expiry in years, `r`: risk-free
/// rate, `sigma`: annualized vol. At expiry (or degenerate vol/spot) the
/// intrinsic value is returned.
pub fn bs_price(s: f64, k: f64, t: f64, r: f64, sigma: f64, option_type: OptionType) -> f64 {
    if t <= 0.0 || sigma <= 0.0 || s <= 0.0 {
        return intrinsic(s, k, option_type);
    }

    let (d1, d2) = d1_d2(s, k, t, r, sigma);
    match option_type {
        OptionType::Call => s * norm_cdf(d1) - k * (-r * t).exp() * norm_cdf(d2),
        OptionType::Put => k * (-r * t).exp() * norm_cdf(-d2) - s * norm_cdf(-d1),
    }
}

/// Black–Scholes greeks. Theta is per day, vega per 1% vol change.
///
/// At expiry the delta collapses to ±1 for ITM contracts and 0 otherwise;
/// the remaining greeks are zero.
pub fn bs_greeks(s: f64, k: f64, t: f64, r: f64, sigma: f64, option_type: OptionType) -> Greeks {
    if t <= 0.0 || sigma <= 0.0 || s <= 0.0 {
        let itm = intrinsic(s, k, option_type) > 0.0;
        let delta = match (itm, option_type) {
            (true, OptionType::Call) => 1.0,
            (true, OptionType::Put) => -1.0,
            _ => 0.0,
        };
        return Greeks {
            delta,
            iv: sigma.max(0.0),
            ..Greeks::default()
        };
    }

    let sqrt_t = t.sqrt();
    let (d1, d2) = d1_d2(s, k, t, r, sigma);
    let pdf_d1 = norm_pdf(d1);

    let delta = match option_type {
        OptionType::Call => norm_cdf(d1),
        OptionType::Put => norm_cdf(d1) - 1.0,
    };

    let gamma = pdf_d1 / (s * sigma * sqrt_t);

    let theta_term = -(s * pdf_d1 * sigma) / (2.0 * sqrt_t);
    let theta_annual = match option_type {
        OptionType::Call => theta_term - r * k * (-r * t).exp() * norm_cdf(d2),
        OptionType::Put => theta_term + r * k * (-r * t).exp() * norm_cdf(-d2),
    };

    Greeks {
        delta,
        gamma,
        theta: theta_annual / DAYS_PER_YEAR,
        vega: s * pdf_d1 * sqrt_t / 100.0,
        iv: sigma,
    }
}

/// Implied volatility from a USD market price.
///
/// Brent's method on `bs_price − market_price` over [0.01, 10.0]; falls
/// back to bisection when the root is not bracketed cleanly. Returns 0 when
/// the market price sits below discounted intrinsic (no vol can explain it)
/// or the inputs are degenerate.
pub fn implied_vol(
    market_price: f64,
    s: f64,
    k: f64,
    t: f64,
    r: f64,
    option_type: OptionType,
) -> f64 {
    if market_price <= 0.0 || t <= 0.0 || s <= 0.0 || k <= 0.0 {
        return 0.0;
    }

    let discounted_intrinsic = match option_type {
        OptionType::Call => (s - k * (-r * t).exp()).max(0.0),
        OptionType::Put => (k * (-r * t).exp() - s).max(0.0),
    };
    if market_price < discounted_intrinsic {
        return 0.0;
    }

    let objective = |sigma: f64| bs_price(s, k, t, r, sigma, option_type) - market_price;

    if let Some(root) = brent(objective, IV_LOW, IV_HIGH, IV_TOL, IV_MAX_ITER) {
        return root;
    }

    // Bisection fallback. bs_price is monotone in sigma, so halving on the
    // price comparison converges even without a sign bracket.
    let (mut low, mut high) = (IV_LOW, IV_HIGH);
    for _ in 0..IV_MAX_ITER {
        let mid = 0.5 * (low + high);
        let price = bs_price(s, k, t, r, mid, option_type);
        if (price - market_price).abs() < IV_TOL {
            return mid;
        }
        if price > market_price {
            high = mid;
        } else {
            low = mid;
        }
    }
    0.5 * (low + high)
}

/// Brent root finder. Returns `None` when [a, b] does not bracket a root.
fn brent<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, tol: f64, max_iter: usize) -> Option<f64> {
    let (mut a, mut b) = (a, b);
    let (mut fa, mut fb) = (f(a), f(b));

    if fa * fb > 0.0 {
        return None;
    }
    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut mflag = true;

    for _ in 0..max_iter {
        if fb.abs() < tol || (b - a).abs() < tol {
            return Some(b);
        }

        let mut s = if (fa - fc).abs() > f64::EPSILON && (fb - fc).abs() > f64::EPSILON {
            // Inverse quadratic interpolation
            a * fb * fc / ((fa - fb) * (fa - fc))
                + b * fa * fc / ((fb - fa) * (fb - fc))
                + c * fa * fb / ((fc - fa) * (fc - fb))
        } else {
            // Secant
            b - fb * (b - a) / (fb - fa)
        };

        let lo = (3.0 * a + b) / 4.0;
        let cond = !((lo..=b).contains(&s) || (b..=lo).contains(&s))
            || (mflag && (s - b).abs() >= (b - c).abs() / 2.0)
            || (!mflag && (s - b).abs() >= (c - d).abs() / 2.0)
            || (mflag && (b - c).abs() < tol)
            || (!mflag && (c - d).abs() < tol);

        if cond {
            s = 0.5 * (a + b);
            mflag = true;
        } else {
            mflag = false;
        }

        let fs = f(s);
        d = c;
        c = b;
        fc = fb;

        if fa * fs < 0.0 {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }

        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }
    }

    Some(b)
}
