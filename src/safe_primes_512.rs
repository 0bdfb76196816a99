//! A pool of pre-generated 512-bit safe primes, for testing only.
//!
//! Generating safe primes is by far the most expensive operation in the
//! suite, so the tests draw from this fixed pool instead. Never use these
//! primes outside of tests: they are public knowledge.

/// 512-bit safe primes (hex, big-endian). Every entry `p` satisfies
/// `p = 2q + 1` with `q` prime, and `p = 3 mod 4`.
pub(crate) const SAFE_PRIMES: [&str; 32] = [
    "99ef4d31e5b276df22c29341ed43b324a38c975c3bcde92238bfe6eb59e7dd4c081e086a56ba9a287610810947c2f2246221b513bf703227d5f5bf80a0899a57",
    "8b25576d51707885de74b1d4d07db83d8ff5778616a3b84cf42eaad780b5fe4b7ec1923d808deadefceea83fd6bc92709e825dc16f66bfdbebc42584e6b478d3",
    "c88647b44efe9b7f965ee787d854a17135cfeac2a7aafd219e451993c22d3011e6a2ec018cfa2d25abd7035ae7281274ee0bef12509367ff0dcbf97630705247",
    "844ee71ee07cbb1ccfd2f8adbe662ffed2b7f0ed469f582158be9451f56199cdcdc2333d2117b3f18c83dfbbe2d5893dcd4ddfb0d445372f017aed51b2ad07a7",
    "dfa9764fe2e20dee8bd1e155c551a5fde873453b22dd94408e8f307edbce4a9ff72e252ee77c12cf2c1f30f627218eedf26fd3a472353dc07f211ed42d44ffdb",
    "f4d92722c9af19054d083d8bf94a92be4331a744915dc12fcf95ed6b73bfc1be199219b54cf05c1fd3ded92f1b6e394bf0f96e6ab7e905b6fa0cdfae7b74d527",
    "e4dc23cddb584a31aedbe970b929b24e47a43c2a6ba71785d164260877cf31abbac985ce0d0a7be8c6014c3956e85de6473e0fb871911d9b06d1321bf468380f",
    "cb7cc4d8672bd4c25ab3d2a40057da1944f237e6f2134453ca7a00b34de133b5cc4efe01db4032986a689291aab51d8fa2ff4a7fc0ed66a87db3be12e3d3352b",
    "86547b740b361e1e52b76e896361ba46fb29c0b8e7cfb10c7a1c2124da0117dbb0e2ee5ba544c8430cfc1471be2000874b03588e05aa89c39155ea485745b2bf",
    "f4434c80d7ab2659c44e7fcd50a7c9f7586e087b668eb2c7a993d37c4b71489aa8083380e4b6964a11ce8eea28fb2b6c1ee5763eb9f8e345452fe82337976f1f",
    "8aba40f50f5c3105b6576bf66030b581092bd0f620a8947addd465e67e9ca2b1cef995efeabcf91a53e844b296c4d6b9d24c4e2d7e7482d85d54216e0384fcfb",
    "ea71743012b9f186a52b1da32602023b4ad76eaff8b8606161c4b52f9306ac68e40cedfd74b09051502331f815b18187694ae0bebabefa7440a224c897f1738b",
    "9cf4a94d5e5ca61d6489ee1ffb0bbec1a655193b0de87bf41e71170d9444b6c28877c955ed183b0b1b959be83e5a793ebc2a75d94d04293cb8a9d28073f0090b",
    "a8af43d14b046bfa11f1cea7987998eb15d1c3c556b9f954c0819fa866037637799a397ccbe381fc7b50c7bd2453dfcdcdce814d1aeb64e25c46af3868f529f7",
    "b2b1e8f4c8fb5f402b49c9f6c6fa8d6567c9364eaddd7aa1f6c4e264d5423d7a8e314aec7d5534b1b5630b3beb9aec351e9828a92e401f1cb81dca2a5d3136c7",
    "a20f4f95d519b006a3f29f20e143c2018cba730bb8e0e042b09bb4539eb98ffcced5df7a7ad3be8c30b948af4d8bafc3794aa5d01a3026f481d4c88d2f716617",
    "ca2f8c58309651fe921c22c16cbd81092b385182061bcb4ad6a26ce1e6b87e8840b8a43ec2ecacb6855d1f415017cc26039f732e3102704e14fd09e1df7e47bb",
    "d353ac5132c2e9ac0ebe513de048fd8f82207a51ccb054ce500890085be8b50d7208c92730b34f3ed681e80130f78a86d2367a6746219dce7fc109c71a50d517",
    "887878353e01d460ab7eb33f36f341d38da1c2fc1cb0722d528f2f2d7a989f38d94434681365e8449725714536ebd2ee5e674293d779515163eabe2862b3d7db",
    "a61fc938a2a09de74ddb31dfc24ba4117713ac836e162f3a1146194a30bcbe50593c023943ceb4f12ebc564b10f192bd6165e83e961dd38e1c25cb5b822a773f",
    "ecdcd04ca2963e07a2506141c2e564cd2d866628b37fc171df8a0d07cb0cc24c07f6827c69af5084e7b09f87514cffc75b9465ed9606819f91852ffd41db8e9b",
    "e34e333acb142cd36c4ef6e4079bb1cfb40c558c99d63514d8514f31efb1f0823bd6ece6e4c29cc7420835a20b1bcb66ca090929b366f81172400a447c7d5ef7",
    "91ecec118801d00535539dc0a86572b0b67bb502b6f7de483b3161f33340146e8fc958a79bbc5a2bd11c5ddbbef8392258c38e8174f8a1f622492931252fe34f",
    "f534d06d8a8ffc942ec7429e89b9eef7503b247f22f898bc3b0cc089cf09daca123178f52e7be48f83ecb602c5b28c141aa650b78fd651d9f878b2e3a0ebd75b",
    "a8fb7e22ad33645f386163ee7ac6945ec2faa73e8ca1a48c464a6fcf771a108d35396f7da57b0a6bc5421f3deedf0f86e70e53d1c0860d14353ba73ad6a15693",
    "d7ad0f60d5f88991620dfc6eb3daf8bf05cd41546d0620b95b9fd1ccb73381b8a28bcba703c0fc389c4ab9767e89da24b059f28d26e431bc038cce3c511ad1c3",
    "b45ec894f02214aca6a1fe85cd67e9a5073817dbd64e40bcf771a039b6463ade999848f3cdbe46b66371d44642912a570c655be772a5ea78274f94b3c714937f",
    "cd4dae26fe7cdea39b72e678a608b7220da84c496401c841ba395329de638ce2825294cf4354b03cb2b5c0ca1bbb4135e6fc5d59684415135936bdcf5db33623",
    "f9a1040dd0844bbdf2dc0096e438d5a460de97e5d7d1bfcadfa92229da1c6d2f56cd06d96e7c9d6c077fec2e286b4872c4c283ba2410db3f485de39e08fa460f",
    "c11d630d2c9ed651a8c122337acdb4bcee9cc06c6f6c2535350e05af62af2f28ba8c97a0d0e680370d28f296ee2a0b3b40caacc1aeb218b83df2ee57a7898c27",
    "b53bef81d44eca2cebbcdae56f16ac26794146f65cb3fc746f6a690c8758c6a4b6f1bffc667e3f9da857e108c34148f65e0c0a4545c073ecf7b148093bd9552f",
    "f99bd3bb4def92e2038a3672de9331c195585e6b5bf63cb9a5154beaf2433eda517be3bef6676f78a9abde69981bda188dfc69a0f99fc7fa548c7d93ee5e855f",
];
