//! # 工作量证明（PoW）契约
//!
//! 上游在接受补全请求前要求先解出一个按请求下发的哈希谜题。
//! 本模块定义挑战/应答的数据结构、应答信封的头部编码，以及求解器
//! 的窄接口 [`PowSolver`]。上游具体哈希变体的逐位复刻不在范围内，
//! 接口即契约；内置实现做一次受难度约束的有界搜索。

use crate::error::{ProxyError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 上游下发的 PoW 挑战描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowChallenge {
    /// 算法标签（如 `DeepSeekHashV1`）
    pub algorithm: String,
    /// 挑战字符串
    pub challenge: String,
    /// 盐值
    pub salt: String,
    /// 难度
    pub difficulty: u64,
    /// 过期时间戳
    pub expire_at: i64,
    /// 上游签名，原样回传
    pub signature: String,
    /// 目标路径，原样回传
    pub target_path: String,
}

/// 挑战字段加上求得的整数答案，编码后随下一个请求的头部上送。
/// 每个补全请求一个信封；挑战单次使用，不支持复用。
#[derive(Debug, Serialize)]
struct PowSolution<'a> {
    algorithm: &'a str,
    challenge: &'a str,
    salt: &'a str,
    answer: u64,
    signature: &'a str,
    target_path: &'a str,
}

/// PoW 求解能力
///
/// `solve` 返回 `Ok(None)` 表示在内部界限内未找到答案，调用方必须
/// 将其视为该请求的硬失败（同一挑战不可重试）。实现持有进程级
/// 可变暂存内存，并发调用必须在外层串行化（见
/// [`Gateway`](crate::service::Gateway) 中的 `tokio::sync::Mutex`）。
pub trait PowSolver: Send {
    /// 对给定挑战执行有界搜索，返回整数答案
    fn solve(&mut self, challenge: &PowChallenge) -> Result<Option<u64>>;
}

/// 内置的有界哈希搜索求解器
///
/// 将 `salt_expireAt_` 前缀与候选答案拼接后做 sha256，摘要前 8 字节
/// 低于难度推导的阈值即视为命中；搜索步数同样由难度限定。
#[derive(Debug, Default)]
pub struct HashSearchSolver {
    /// 复用的哈希输入暂存区
    scratch: Vec<u8>,
}

impl HashSearchSolver {
    /// 创建求解器
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 搜索步数上限
    const fn search_bound(difficulty: u64) -> u64 {
        difficulty.saturating_mul(16)
    }
}

impl PowSolver for HashSearchSolver {
    fn solve(&mut self, challenge: &PowChallenge) -> Result<Option<u64>> {
        if challenge.difficulty == 0 {
            return Err(ProxyError::solver("challenge difficulty is zero"));
        }

        let prefix = format!("{}_{}_", challenge.salt, challenge.expire_at);
        let threshold = u64::MAX / challenge.difficulty;

        for answer in 0..Self::search_bound(challenge.difficulty) {
            self.scratch.clear();
            self.scratch.extend_from_slice(challenge.challenge.as_bytes());
            self.scratch.extend_from_slice(prefix.as_bytes());
            self.scratch.extend_from_slice(answer.to_string().as_bytes());

            let digest = Sha256::digest(&self.scratch);
            let head = u64::from_be_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]);
            if head <= threshold {
                return Ok(Some(answer));
            }
        }

        Ok(None)
    }
}

/// 将挑战与答案编码为信封头部值：base64(JSON)
#[must_use]
pub fn encode_solution(challenge: &PowChallenge, answer: u64) -> String {
    let solution = PowSolution {
        algorithm: &challenge.algorithm,
        challenge: &challenge.challenge,
        salt: &challenge.salt,
        answer,
        signature: &challenge.signature,
        target_path: &challenge.target_path,
    };
    // PowSolution 全部字段可序列化，serde_json 不会失败
    let json = serde_json::to_vec(&solution).unwrap_or_default();
    STANDARD.encode(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(difficulty: u64) -> PowChallenge {
        PowChallenge {
            algorithm: "DeepSeekHashV1".into(),
            challenge: "c3f0a9".into(),
            salt: "salt".into(),
            difficulty,
            expire_at: 1_735_689_600,
            signature: "sig".into(),
            target_path: "/api/v0/chat/completion".into(),
        }
    }

    #[test]
    fn test_solver_finds_answer_for_low_difficulty() {
        let mut solver = HashSearchSolver::new();
        // 难度极低时阈值接近 u64::MAX，首个候选即命中
        let answer = solver.solve(&challenge(1)).unwrap();
        assert_eq!(answer, Some(0));
    }

    #[test]
    fn test_solver_is_deterministic() {
        let mut solver = HashSearchSolver::new();
        let a = solver.solve(&challenge(64)).unwrap();
        let b = solver.solve(&challenge(64)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_difficulty_is_an_error() {
        let mut solver = HashSearchSolver::new();
        assert!(solver.solve(&challenge(0)).is_err());
    }

    #[test]
    fn test_solution_envelope_roundtrip() {
        let encoded = encode_solution(&challenge(8), 42);
        let decoded = STANDARD.decode(encoded).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["answer"], 42);
        assert_eq!(value["algorithm"], "DeepSeekHashV1");
        assert_eq!(value["target_path"], "/api/v0/chat/completion");
        // 信封不包含难度与过期时间，只回传签名所覆盖的字段
        assert!(value.get("difficulty").is_none());
    }
}
